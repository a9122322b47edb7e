//! Locally stored access token.

use std::{fmt::Debug, sync::RwLock};

/// Where clients look up the access token when none was given explicitly.
pub trait TokenStore: Send + Sync + Debug {
    /// current access token, if any
    fn access_token(&self) -> Option<String>;
}

/// In memory token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Create a store holding `token`
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replace stored token, `None` for logout
    pub fn set(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
