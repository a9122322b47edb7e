use snafu::prelude::*;

/// Error type produced by a [`Backend`](super::Backend)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a [`Backend`](super::Backend) produced no response
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(backend_error), context(suffix(false)))]
pub enum BackendError {
    /// request can't be built (invalid url, unserializable body), nothing was sent
    #[snafu(display("build request failed: {source}"))]
    Build {
        /// source error
        source: BoxError,
    },

    /// request was sent but no response came back (network, DNS, TLS)
    #[snafu(display("no response: {source}"))]
    Unreachable {
        /// source error
        source: BoxError,
    },
}

/// API Error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(variant), context(suffix(false)))]
pub enum Error {
    /// create HTTP client failed
    #[snafu(display("create api client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: reqwest::Error,
    },

    /// build api request failed
    #[snafu(display("build request {} {path} failed: {source}", method.as_str()))]
    BuildRequestFailed {
        /// http method
        method: reqwest::Method,
        /// request path
        path: String,
        /// source error
        source: BoxError,
    },

    /// no response reached the gateway
    #[snafu(display("{} {path} failed: {source}", method.as_str()))]
    RequestFailed {
        /// http method
        method: reqwest::Method,
        /// request path
        path: String,
        /// source http error
        source: BoxError,
    },

    /// server answered with a non success status
    #[snafu(display("{} {path} got http status code {status}", method.as_str()))]
    Status {
        /// http method
        method: reqwest::Method,
        /// request path
        path: String,
        /// received http status code
        status: reqwest::StatusCode,
        /// human readable message extracted from body
        message: Option<String>,
    },

    /// access token can't be refreshed, user need login again
    #[snafu(display("session expired"))]
    SessionExpired,

    /// serialize request body failed
    #[snafu(display("encode request body failed: {source}"))]
    EncodeBodyFailed {
        /// source error
        source: serde_json::Error,
    },

    /// parse response body as target json type failed
    #[snafu(display("parse response body {body:?} failed: {source}"))]
    ParseBodyFailed {
        /// http response body
        body: bytes::Bytes,
        /// source parse error
        source: serde_json::Error,
    },
}

impl Error {
    /// http status of the failed call, if a response was received
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error means the user session is gone
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}
