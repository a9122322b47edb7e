//! Server sent notification stream

mod client;
mod decoder;
mod types;

pub use client::{Client, Options};
pub use types::{Notification, NotifyText, PostNotice};

use snafu::prelude::*;

/// Error of sse client
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum Error {
    /// stream path is not absolute
    #[snafu(display("sse stream path {path} must start with '/'"))]
    InvalidPath {
        /// configured path
        path: String,
    },
}
