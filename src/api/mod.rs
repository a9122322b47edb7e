//! CodeTT3 REST api gateway

mod backend;
mod client;
mod error;
mod loading;
mod refresh;
pub mod types;

pub use backend::{Backend, ByteStream, HttpBackend};
pub use client::Gateway;
pub use error::{BackendError, BoxError, Error};
pub use types::{Request, Response};

/// Result type for api module
pub type Result<T> = std::result::Result<T, Error>;
