//! crate error types

use snafu::prelude::*;

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Load endpoint config failed
    #[snafu(display("load config failed: {source}"))]
    LoadConfigFailed {
        /// source error
        source: crate::config::Error,
    },

    /// Call CodeTT3 api failed
    #[snafu(display("call api failed: {source}"))]
    CallAPIFailed {
        /// source error
        source: crate::api::Error,
    },

    /// Realtime client operation failed
    #[snafu(display("realtime client failed: {source}"))]
    RealtimeFailed {
        /// source error
        source: crate::ws::Error,
    },

    /// Sse client operation failed
    #[snafu(display("sse client failed: {source}"))]
    NotificationFailed {
        /// source error
        source: crate::sse::Error,
    },
}
