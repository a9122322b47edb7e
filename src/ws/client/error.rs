use snafu::prelude::*;
use tokio_tungstenite::tungstenite;

/// Error of realtime client operations
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum Error {
    /// realtime url can't be parsed
    #[snafu(display("{url} is an invalid url: {source}"))]
    InvalidUrl {
        /// base + path
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// realtime url is not websocket
    #[snafu(display("the url {url} has invalid schema {schema}, only ws or wss is ok"))]
    InvalidSchema {
        /// base + path
        url: String,
        /// invalid schema
        schema: String,
    },

    /// connection is not open, message dropped
    #[snafu(display("realtime connection is not open"))]
    NotConnected,

    /// serialize message failed
    #[snafu(display("encode message failed: {source}"))]
    EncodeFailed {
        /// source error
        source: serde_json::Error,
    },

    /// write to connection failed
    #[snafu(display("send message failed: {source}"))]
    SendFailed {
        /// source error
        source: tungstenite::Error,
    },
}

/// Error reported to [`Handler::on_error`](super::Handler::on_error)
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(connection_error), context(suffix(false)))]
pub enum ConnectionError {
    /// open connection failed
    #[snafu(display("connect realtime {path} failed: {source}"))]
    Connect {
        /// stream path
        path: String,
        /// source error
        source: tungstenite::Error,
    },

    /// read from an open connection failed
    #[snafu(display("read realtime {path} failed: {source}"))]
    Read {
        /// stream path
        path: String,
        /// source error
        source: tungstenite::Error,
    },
}
