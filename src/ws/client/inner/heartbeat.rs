use std::time::Duration;

use futures_util::SinkExt;
use tokio::{task::JoinHandle, time::Instant};
use tokio_tungstenite::tungstenite::Message as Frame;

use super::SharedSink;
use crate::ws::message::HEARTBEAT_FRAME;

/// Background task sending [`HEARTBEAT_FRAME`] every interval.
///
/// Replies are not awaited, liveness comes from the connection's own close/error.
/// The task is aborted when this value is dropped.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(sink: SharedSink, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            log::debug!("Heartbeat start, interval {:?}", interval);

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let mut guard = sink.lock().await;
                let Some(sink) = guard.as_mut() else {
                    log::debug!("Heartbeat find connection gone, stop");
                    break;
                };

                log::trace!("Send heartbeat");

                if let Err(err) = sink.send(Frame::Text(HEARTBEAT_FRAME.to_string())).await {
                    log::debug!("Heartbeat find connection broken: {}, stop", err);
                    break;
                }
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
