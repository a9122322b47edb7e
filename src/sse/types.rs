use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

/// A notification pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// receiver
    pub user: String,
    /// server timestamp
    pub timestamp: String,
    /// content
    pub message: NotifyText,
}

/// Notification content, plain text or a post reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumAsInner)]
#[serde(untagged)]
pub enum NotifyText {
    /// plain text
    Plain(String),
    /// something happened around a post
    Post(PostNotice),
}

/// Notification about a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostNotice {
    /// text to show
    pub message: String,
    /// related post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    /// who did it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl NotifyText {
    /// text to show
    pub fn text(&self) -> &str {
        match self {
            NotifyText::Plain(text) => text,
            NotifyText::Post(post) => &post.message,
        }
    }
}
