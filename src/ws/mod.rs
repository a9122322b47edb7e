//! Realtime websocket transport client

mod client;
pub mod message;

pub use client::{
    Client, ConnectionError, ConnectionState, Decision, Error, Event, Handler, Ignore, Options,
    ReconnectPolicy,
};
pub use message::{CloseInfo, Message};
