//! User facing notices.
//!
//! Both the gateway and the realtime clients report conditions the user should
//! see (lost connectivity, expired session, reconnect progress...) through a
//! [`Notifier`]. The embedding UI decides how to render them.

use std::fmt::{Debug, Display};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// something recoverable is going on
    Warning,
    /// an operation failed
    Error,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// no response reached the gateway
    Connectivity,
    /// access token can not be refreshed any more, user must login again
    SessionExpired,
    /// server returned a 5xx without a readable message
    ServerError,
    /// server rejected the request with a readable message
    Rejected(String),
    /// realtime server closed the connection because the token expired
    RealtimeAuthExpired,
    /// realtime server refused the connection (origin/policy)
    RealtimeRejected,
    /// realtime connection lost, a reconnect is scheduled
    Reconnecting {
        /// attempt number, starts from 1
        attempt: u32,
        /// max attempt count
        max: u32,
    },
    /// realtime reconnect attempts are exhausted
    RealtimeUnreachable,
    /// tried to send on a realtime client which is not open
    NotConnected,
}

/// A notice for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// severity
    pub level: Level,
    /// what happened
    pub kind: NoticeKind,
}

impl Notice {
    /// Create an error level notice
    pub fn error(kind: NoticeKind) -> Self {
        Self {
            level: Level::Error,
            kind,
        }
    }

    /// Create a warning level notice
    pub fn warning(kind: NoticeKind) -> Self {
        Self {
            level: Level::Warning,
            kind,
        }
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NoticeKind::Connectivity => {
                f.write_str("Can't connect to the server, please try again later.")
            }
            NoticeKind::SessionExpired => {
                f.write_str("Your session has expired, please log in again.")
            }
            NoticeKind::ServerError => f.write_str("System error, please try again later."),
            NoticeKind::Rejected(message) => f.write_str(message),
            NoticeKind::RealtimeAuthExpired => {
                f.write_str("Realtime session expired, please log in again.")
            }
            NoticeKind::RealtimeRejected => {
                f.write_str("Realtime connection refused (invalid origin).")
            }
            NoticeKind::Reconnecting { attempt, max } => {
                write!(f, "Connection lost... retrying ({}/{})", attempt, max)
            }
            NoticeKind::RealtimeUnreachable => f.write_str("Can't reach the realtime server."),
            NoticeKind::NotConnected => {
                f.write_str("Can't send data, realtime connection is not open.")
            }
        }
    }
}

/// Sink of user facing notices.
pub trait Notifier: Send + Sync + Debug {
    /// show a notice to user
    fn notify(&self, notice: Notice);
}

/// Default notifier, writes every notice to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            Level::Warning => log::warn!("{}", notice),
            Level::Error => log::error!("{}", notice),
        }
    }
}
