//! Realtime message frames and close codes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Keep-alive frame, sent as raw text, not json
pub const HEARTBEAT_FRAME: &str = "ping";

/// normal closure
pub const NORMAL: u16 = 1000;
/// close frame carried no status code
pub const NO_STATUS: u16 = 1005;
/// connection dropped without a close frame, or never opened
pub const ABNORMAL: u16 = 1006;
/// server side: token expired or invalid, user must login again
pub const AUTH_EXPIRED: u16 = 4401;
/// server side: origin or policy rejection
pub const POLICY_REJECTED: u16 = 4403;

/// Json frame exchanged with the realtime server: `{ type?, data, created_at? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<T> {
    /// message type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// payload
    pub data: T,
    /// server timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl<T> Message<T> {
    /// Create an untyped message
    pub fn new(data: T) -> Self {
        Self {
            kind: None,
            data,
            created_at: None,
        }
    }

    /// set message type
    pub fn with_kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

impl<T: DeserializeOwned> Message<T> {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl<T: Serialize> Message<T> {
    /// Encode to a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// close code
    pub code: u16,
    /// reason sent by peer
    pub reason: String,
}

impl CloseInfo {
    /// Create close info
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// connection dropped or never opened
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL, "")
    }

    pub(crate) fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self::new(u16::from(frame.code), frame.reason.into_owned()),
            None => Self::new(NO_STATUS, ""),
        }
    }
}
