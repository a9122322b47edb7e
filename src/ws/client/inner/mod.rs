mod heartbeat;
mod supervisor;

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex, MutexGuard,
};

use futures_util::stream::SplitSink;
use snafu::prelude::*;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message as Frame;

use super::{error::error, policy::ReconnectPolicy, Error, Handler, Options};
use crate::{
    notify::{Notice, Notifier},
    token::TokenStore,
};
use heartbeat::Heartbeat;

pub(crate) type WebsocketClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

pub(crate) type SharedSink = Arc<tokio::sync::Mutex<Option<SplitSink<WebsocketClient, Frame>>>>;

/// Lifecycle state of a realtime client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// no connection, no attempt pending
    Disconnected,
    /// opening a connection
    Connecting,
    /// connection is open
    Open,
    /// caller initiated close in progress
    Closing,
    /// connection lost, attempt `attempt` will start after the reconnect delay
    ReconnectScheduled {
        /// attempt number, starts from 1
        attempt: u32,
    },
}

/// State shared by a client handle, its connection task and heartbeat.
pub(crate) struct Shared<T> {
    pub base: String,
    pub options: Options,
    pub tokens: Arc<dyn TokenStore>,
    pub notifier: Arc<dyn Notifier>,
    pub handler: Arc<dyn Handler<T>>,
    pub sink: SharedSink,
    heartbeat: Mutex<Option<Heartbeat>>,
    retry_count: AtomicU32,
    state: watch::Sender<ConnectionState>,
}

impl<T> std::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("base", &self.base)
            .field("options", &self.options)
            .field("retry_count", &self.retry_count())
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Shared<T> {
    pub fn new(
        base: String,
        options: Options,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        handler: Arc<dyn Handler<T>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            base,
            options,
            tokens,
            notifier,
            handler,
            sink: Arc::new(tokio::sync::Mutex::new(None)),
            heartbeat: Mutex::new(None),
            retry_count: AtomicU32::new(0),
            state,
        }
    }

    /// `<base><path>?token=<token>`, token falls back to the token store
    pub fn url(&self) -> Result<url::Url, Error> {
        let raw = format!("{}{}", self.base, self.options.path);
        let mut url = url::Url::parse(&raw).with_context(|_| error::InvalidUrl { url: &raw })?;

        ensure!(
            url.scheme() == "ws" || url.scheme() == "wss",
            error::InvalidSchema {
                url: &raw,
                schema: url.scheme(),
            }
        );

        let token = self
            .options
            .token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| self.tokens.access_token())
            .filter(|token| !token.is_empty());

        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", &token);
        }

        Ok(url)
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.options.reconnect,
            max_retries: self.options.max_retries,
            delay: self.options.reconnect_delay,
        }
    }

    pub fn notify(&self, notice: Notice) {
        self.notifier.notify(notice)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: ConnectionState) {
        log::trace!("Realtime {} move to {:?}", self.options.path, state);
        self.state.send_replace(state);
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn set_retry_count(&self, count: u32) {
        self.retry_count.store(count, Ordering::SeqCst)
    }

    fn heartbeat_slot(&self) -> MutexGuard<'_, Option<Heartbeat>> {
        self.heartbeat
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start heartbeat, any running one is stopped first
    pub fn start_heartbeat(&self) {
        let mut slot = self.heartbeat_slot();
        if slot.take().is_some() {
            log::debug!("Stop previous heartbeat");
        }
        *slot = Some(Heartbeat::start(
            self.sink.clone(),
            self.options.heartbeat_interval,
        ));
    }

    pub fn stop_heartbeat(&self) {
        if self.heartbeat_slot().take().is_some() {
            log::debug!("Heartbeat stopped");
        }
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat_slot()
            .as_ref()
            .map(Heartbeat::is_running)
            .unwrap_or(false)
    }
}
