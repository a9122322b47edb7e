use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use futures_util::StreamExt;
use snafu::prelude::*;
use tokio::task::JoinHandle;

use super::decoder::{Decoder, Event};
use super::types::Notification;
use super::{error, Error};
use crate::api::{ByteStream, Gateway};

const DEFAULT_PATH: &str = "/sse/stream";
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Options of a sse [`Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    path: String,
    reconnect_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl Options {
    /// Stream at `path` of the api base url
    pub fn path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = path.into();
        self
    }

    /// Wait after a successful token refresh before reconnecting
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}

type Listener = Box<dyn Fn(&Notification) + Send + Sync>;

struct Shared {
    gateway: Gateway,
    options: Options,
    listeners: Mutex<Vec<Listener>>,
    connected: AtomicBool,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("options", &self.options)
            .field("listeners", &self.listeners().len())
            .field("connected", &self.connected)
            .finish()
    }
}

impl Shared {
    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(self: Arc<Self>) {
        let path = &self.options.path;

        loop {
            log::debug!("Opening sse stream {}", path);

            match self.gateway.backend().stream(path).await {
                Ok(stream) => {
                    log::info!("Sse stream {} connected", path);
                    self.connected.store(true, Ordering::SeqCst);
                    self.consume(stream).await;
                }
                Err(err) => log::warn!("Open sse stream {} failed: {}", path, err),
            }

            self.connected.store(false, Ordering::SeqCst);

            // the gateway reports an expired session itself
            if let Err(err) = self.gateway.refresh().await {
                log::warn!("Sse stream {} stop, refresh token failed: {}", path, err);
                return;
            }

            log::debug!(
                "Sse stream {} reconnect in {:?}",
                path,
                self.options.reconnect_interval
            );

            tokio::time::sleep(self.options.reconnect_interval).await;
        }
    }

    async fn consume(&self, mut stream: ByteStream) {
        let mut decoder = Decoder::default();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.feed(&chunk) {
                        self.dispatch(event);
                    }
                }
                Err(err) => {
                    log::warn!("Sse stream {} broken: {}", self.options.path, err);
                    return;
                }
            }
        }

        log::debug!("Sse stream {} ended", self.options.path);
    }

    fn dispatch(&self, event: Event) {
        if !event.is_message() {
            log::trace!("Ignore sse event of type {:?}", event.event);
            return;
        }

        log::trace!("Sse event, last id {:?}", event.id);

        match serde_json::from_str::<Notification>(&event.data) {
            Ok(notification) => {
                for listener in self.listeners().iter() {
                    listener(&notification);
                }
            }
            Err(err) => log::trace!("Drop malformed sse data {:?}: {}", event.data, err),
        }
    }
}

/// Server sent notification client.
///
/// Runs over the [`Gateway`] backend, so it shares its credentials. When the
/// stream breaks the access token is refreshed and the stream reopened after
/// the reconnect interval. A failed refresh stops the client.
#[derive(Debug)]
pub struct Client {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Create a disconnected client
    pub fn new(gateway: Gateway, options: Options) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                options,
                listeners: Mutex::default(),
                connected: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// (Re)open the stream in background, must be called inside a tokio runtime
    pub fn connect(&self) -> Result<(), Error> {
        let path = &self.shared.options.path;
        ensure!(path.starts_with('/'), error::InvalidPath { path });

        let mut task = self.task();
        if let Some(old) = task.take() {
            log::debug!("Drop previous sse stream task");
            old.abort();
        }
        *task = Some(tokio::spawn(self.shared.clone().run()));

        Ok(())
    }

    /// Add a listener, listeners are called in registration order
    pub fn on_message<F>(&self, listener: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.shared.listeners().push(Box::new(listener));
    }

    /// Stop the stream and forget every listener
    pub fn close(&self) {
        if let Some(task) = self.task().take() {
            log::debug!("Closing sse stream {}", self.shared.options.path);
            task.abort();
        }
        self.shared.listeners().clear();
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    /// true while the stream is open
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
