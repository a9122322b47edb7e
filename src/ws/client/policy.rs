use std::time::Duration;

use crate::ws::message::{AUTH_EXPIRED, POLICY_REJECTED};

/// What to do after a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// token rejected, user must login again
    AuthExpired,
    /// origin/policy rejected
    Rejected,
    /// schedule attempt number `attempt`
    Retry {
        /// attempt number, starts from 1
        attempt: u32,
    },
    /// retries used up
    Exhausted,
    /// reconnect disabled, stop quietly
    Stop,
}

/// Fixed delay, bounded retry reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// reconnect on transient close
    pub enabled: bool,
    /// max consecutive attempts
    pub max_retries: u32,
    /// wait before each attempt
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Decide what follows a close with `code`, given `retry_count` attempts since last open
    pub fn decide(&self, code: u16, retry_count: u32) -> Decision {
        match code {
            AUTH_EXPIRED => Decision::AuthExpired,
            POLICY_REJECTED => Decision::Rejected,
            _ if self.enabled && retry_count < self.max_retries => Decision::Retry {
                attempt: retry_count + 1,
            },
            _ if retry_count >= self.max_retries => Decision::Exhausted,
            _ => Decision::Stop,
        }
    }
}
