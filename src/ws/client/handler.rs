use tokio::sync::mpsc;

use super::ConnectionError;
use crate::ws::message::{CloseInfo, Message};

/// Receiver of realtime connection events.
///
/// Every method defaults to doing nothing. Methods are called from the
/// connection task and should return quickly.
pub trait Handler<T>: Send + Sync + 'static {
    /// connection opened
    fn on_open(&self) {}

    /// a well formed message arrived
    fn on_message(&self, _message: Message<T>) {}

    /// connection closed, called before any reconnect decision
    fn on_close(&self, _close: &CloseInfo) {}

    /// connect or read failed, a close follows
    fn on_error(&self, _error: &ConnectionError) {}
}

/// Connection events in channel form, see the [`Handler`] impl of [`mpsc::UnboundedSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    /// connection opened
    Open,
    /// message received
    Message(Message<T>),
    /// connection closed
    Close(CloseInfo),
    /// connect or read failed, rendered error
    Error(String),
}

impl<T: Send + 'static> Handler<T> for mpsc::UnboundedSender<Event<T>> {
    fn on_open(&self) {
        let _ = self.send(Event::Open);
    }

    fn on_message(&self, message: Message<T>) {
        let _ = self.send(Event::Message(message));
    }

    fn on_close(&self, close: &CloseInfo) {
        let _ = self.send(Event::Close(close.clone()));
    }

    fn on_error(&self, error: &ConnectionError) {
        let _ = self.send(Event::Error(error.to_string()));
    }
}

/// Handler ignoring every event
#[derive(Debug, Default, Clone, Copy)]
pub struct Ignore;

impl<T> Handler<T> for Ignore {}
