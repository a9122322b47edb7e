//! Endpoint configuration.

use snafu::prelude::*;

/// env var holding api base url, like `https://judge.example.com/api`
pub const API_URL_ENV: &str = "CODETT3_API_URL";
/// env var holding realtime base url, like `wss://judge.example.com/ws`
pub const WS_URL_ENV: &str = "CODETT3_WS_URL";

static DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
static DEFAULT_SSE_PATH: &str = "/sse/stream";

/// Error when build a [`Config`]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum Error {
    /// required env var not set or not unicode
    #[snafu(display("env var {name} is not set: {source}"))]
    MissingVariable {
        /// var name
        name: &'static str,
        /// source error
        source: std::env::VarError,
    },

    /// base url can't be parsed
    #[snafu(display("{url} is an invalid url: {source}"))]
    InvalidUrl {
        /// input url
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// base url has a schema we can't talk
    #[snafu(display("the url {url} has invalid schema {schema}, expect {expect}"))]
    InvalidSchema {
        /// input url
        url: String,
        /// parsed schema
        schema: String,
        /// acceptable schemas
        expect: &'static str,
    },
}

/// Base urls and well known paths of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    api_base: String,
    ws_base: String,
    refresh_path: String,
    sse_path: String,
}

fn normalize(url: &str, schemas: &[&str], expect: &'static str) -> Result<String, Error> {
    let parsed = url::Url::parse(url).with_context(|_| error::InvalidUrl { url })?;

    ensure!(
        schemas.contains(&parsed.scheme()),
        error::InvalidSchema {
            url,
            schema: parsed.scheme(),
            expect,
        }
    );

    Ok(url.trim_end_matches('/').to_string())
}

impl Config {
    /// Create config from api base url (http/https) and realtime base url (ws/wss)
    pub fn new(api_url: &str, ws_url: &str) -> Result<Self, Error> {
        Ok(Self {
            api_base: normalize(api_url, &["http", "https"], "http or https")?,
            ws_base: normalize(ws_url, &["ws", "wss"], "ws or wss")?,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            sse_path: DEFAULT_SSE_PATH.to_string(),
        })
    }

    /// Create config from [`API_URL_ENV`] and [`WS_URL_ENV`]
    pub fn from_env() -> Result<Self, Error> {
        let api = std::env::var(API_URL_ENV).context(error::MissingVariable { name: API_URL_ENV })?;
        let ws = std::env::var(WS_URL_ENV).context(error::MissingVariable { name: WS_URL_ENV })?;

        log::debug!("Config from env: api = {}, ws = {}", api, ws);

        Self::new(&api, &ws)
    }

    /// Use another token refresh endpoint path
    pub fn with_refresh_path<S: Into<String>>(mut self, path: S) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Use another sse stream endpoint path
    pub fn with_sse_path<S: Into<String>>(mut self, path: S) -> Self {
        self.sse_path = path.into();
        self
    }

    /// api base url, without trailing slash
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// realtime base url, without trailing slash
    pub fn ws_base(&self) -> &str {
        &self.ws_base
    }

    /// token refresh endpoint path
    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    /// sse stream endpoint path
    pub fn sse_path(&self) -> &str {
        &self.sse_path
    }
}
