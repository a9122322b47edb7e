//! # codett3-transport
//!
//! Client transport layer of the CodeTT3 judge platform.
//!
//! - [`api::Gateway`]: REST calls with a global loading signal, one coordinated
//!   token refresh for any number of concurrent 401s, and user facing notices.
//! - [`ws::Client`]: one realtime websocket stream with heartbeat and bounded
//!   reconnect.
//! - [`sse::Client`]: server sent notifications.
//!
//! A [`Transport`] ties them to one [`Config`], [`Notifier`] and [`TokenStore`].

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod notify;
pub mod sse;
pub mod token;
pub mod ws;

mod error;
pub use error::{Error, Result};

pub use config::Config;
pub use notify::{LogNotifier, Notice, NoticeKind, Notifier};
pub use token::{MemoryTokenStore, TokenStore};

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use snafu::prelude::*;

/// Entry point, owns the shared gateway and hands out realtime and sse clients.
#[derive(Debug, Clone)]
pub struct Transport {
    config: Config,
    gateway: api::Gateway,
    notifier: Arc<dyn Notifier>,
    tokens: Arc<dyn TokenStore>,
}

impl Transport {
    /// Create transport talking HTTP to the configured api
    pub fn new(
        config: Config,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let gateway =
            api::Gateway::from_config(&config, notifier.clone()).context(error::CallAPIFailed)?;

        log::info!(
            "Create transport, api = {}, realtime = {}",
            config.api_base(),
            config.ws_base()
        );

        Ok(Self::with_gateway(config, gateway, notifier, tokens))
    }

    /// Create transport from env, notices go to the log and tokens are kept in memory
    pub fn from_env() -> Result<Self> {
        let config = Config::from_env().context(error::LoadConfigFailed)?;
        Self::new(
            config,
            Arc::new(LogNotifier),
            Arc::new(MemoryTokenStore::default()),
        )
    }

    /// Create transport over an existing gateway
    pub fn with_gateway(
        config: Config,
        gateway: api::Gateway,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            config,
            gateway,
            notifier,
            tokens,
        }
    }

    /// endpoint config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// shared REST gateway
    pub fn gateway(&self) -> &api::Gateway {
        &self.gateway
    }

    /// token store used by realtime clients
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Create a realtime client for `options`, call [`ws::Client::connect`] to start it
    pub fn stream<T, H>(&self, options: ws::Options, handler: H) -> ws::Client<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        H: ws::Handler<T>,
    {
        ws::Client::new(
            self.config.ws_base(),
            options,
            handler,
            self.tokens.clone(),
            self.notifier.clone(),
        )
    }

    /// Create a sse notification client on the configured stream path
    pub fn notifications(&self) -> sse::Client {
        sse::Client::new(
            self.gateway.clone(),
            sse::Options::default().path(self.config.sse_path()),
        )
    }

    /// Create a realtime client and start connecting it, must be called inside a tokio runtime
    pub fn connect_stream<T, H>(&self, options: ws::Options, handler: H) -> Result<ws::Client<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        H: ws::Handler<T>,
    {
        let client = self.stream(options, handler);
        client.connect().context(error::RealtimeFailed)?;
        Ok(client)
    }

    /// Create a sse notification client and start it, must be called inside a tokio runtime
    pub fn connect_notifications(&self) -> Result<sse::Client> {
        let client = self.notifications();
        client.connect().context(error::NotificationFailed)?;
        Ok(client)
    }
}
