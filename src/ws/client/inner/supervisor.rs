use std::sync::Arc;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use snafu::IntoError;
use tokio::sync::watch;
use tokio_tungstenite::{self as websocket, tungstenite::Message as Frame};

use super::{ConnectionState, Shared, WebsocketClient};
use crate::{
    notify::{Notice, NoticeKind},
    ws::{
        client::{error::connection_error, policy::Decision},
        message::{CloseInfo, Message},
    },
};

impl<T> Shared<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Connection supervisor: connect, serve, then reconnect or stop by close code.
    ///
    /// Returns when the client is closed, a terminal close code arrives or the
    /// retries are used up. Every await point also watches `shutdown`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        log::debug!("Realtime {} supervisor start", self.options.path);

        loop {
            let url = match self.url() {
                Ok(url) => url,
                Err(err) => {
                    log::warn!("Realtime {} has invalid url: {}, stop", self.options.path, err);
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            };

            self.set_state(ConnectionState::Connecting);
            log::debug!("Connecting realtime {}", self.options.path);

            let connected = tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    log::debug!("Realtime {} closed while connecting", self.options.path);
                    return;
                }

                result = websocket::connect_async(url) => result,
            };

            let close = match connected {
                Ok((ws, _)) => match self.serve(ws, &mut shutdown).await {
                    Some(close) => close,
                    None => {
                        log::debug!("Realtime {} closed by owner", self.options.path);
                        return;
                    }
                },
                Err(source) => {
                    let err = connection_error::Connect {
                        path: &self.options.path,
                    }
                    .into_error(source);
                    log::warn!("{}", err);
                    self.handler.on_error(&err);
                    CloseInfo::abnormal()
                }
            };

            self.stop_heartbeat();
            self.sink.lock().await.take();
            self.set_state(ConnectionState::Disconnected);

            log::info!(
                "Realtime {} closed with code {}, reason: {:?}",
                self.options.path,
                close.code,
                close.reason
            );

            self.handler.on_close(&close);

            let policy = self.policy();
            match policy.decide(close.code, self.retry_count()) {
                Decision::AuthExpired => {
                    self.notify(Notice::error(NoticeKind::RealtimeAuthExpired));
                    return;
                }
                Decision::Rejected => {
                    self.notify(Notice::error(NoticeKind::RealtimeRejected));
                    return;
                }
                Decision::Exhausted => {
                    log::warn!("Realtime {} retries used up, stop", self.options.path);
                    self.notify(Notice::error(NoticeKind::RealtimeUnreachable));
                    return;
                }
                Decision::Stop => {
                    log::debug!("Realtime {} reconnect disabled, stop", self.options.path);
                    return;
                }
                Decision::Retry { attempt } => {
                    self.set_retry_count(attempt);
                    self.notify(Notice::warning(NoticeKind::Reconnecting {
                        attempt,
                        max: policy.max_retries,
                    }));
                    self.set_state(ConnectionState::ReconnectScheduled { attempt });

                    log::debug!(
                        "Realtime {} reconnect attempt {} in {:?}",
                        self.options.path,
                        attempt,
                        policy.delay
                    );

                    tokio::select! {
                        biased;

                        _ = shutdown.changed() => {
                            log::debug!("Realtime {} closed, cancel scheduled reconnect", self.options.path);
                            return;
                        }

                        _ = tokio::time::sleep(policy.delay) => {}
                    }
                }
            }
        }
    }

    /// Serve an open connection until it closes, `None` if the owner closed it.
    async fn serve(
        &self,
        ws: WebsocketClient,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<CloseInfo> {
        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        self.set_retry_count(0);
        self.start_heartbeat();
        self.set_state(ConnectionState::Open);

        log::info!("Realtime {} connected", self.options.path);

        self.handler.on_open();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => return None,

                frame = stream.next() => match frame {
                    None => {
                        log::debug!("Realtime {} ended without close frame", self.options.path);
                        return Some(CloseInfo::abnormal());
                    }
                    Some(Err(source)) => {
                        let err = connection_error::Read {
                            path: &self.options.path,
                        }
                        .into_error(source);
                        log::warn!("{}", err);
                        self.handler.on_error(&err);
                        return Some(CloseInfo::abnormal());
                    }
                    Some(Ok(Frame::Close(frame))) => {
                        return Some(CloseInfo::from_frame(frame));
                    }
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(other)) => {
                        log::trace!("Ignore non text frame, {} bytes", other.len());
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match Message::<T>::decode(text) {
            Ok(message) => {
                log::trace!("Received {:?} message", message.kind);
                self.handler.on_message(message);
            }
            Err(err) => {
                log::trace!("Drop malformed frame {:?}: {}", text, err);
            }
        }
    }
}
