// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Messaging surface abstraction and its Slack implementation
//!
//! Message identifiers are Slack timestamps (`ts`), which order messages
//! within a channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod client;
pub mod events;
pub mod files;
pub mod handler;
pub mod memory;

pub use client::{BotIdentity, SlackClient};
pub use events::{EventGate, IncomingMessage};
pub use handler::{HandleOutcome, MessageHandler};
pub use memory::InMemorySurface;

/// Operations the bot needs from a chat service
#[async_trait]
pub trait MessagingSurface: Send + Sync {
    /// Post a message, optionally into a thread. Returns the new message's ID.
    async fn post_message(&self, channel: &str, text: &str, thread_ts: Option<&str>)
        -> Result<String>;

    /// Replace a message's text. Fails with `SurfaceError::MessageTooLong`
    /// when the surface rejects the size.
    async fn update_message(&self, channel: &str, message_id: &str, text: &str) -> Result<()>;

    /// Most recent channel messages, newest first.
    async fn fetch_history(&self, channel: &str, limit: usize) -> Result<Vec<SurfaceMessage>>;

    /// Thread parent followed by its replies, oldest first.
    async fn fetch_thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<SurfaceMessage>>;

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()>;

    /// Download a private file attached to a message.
    async fn download_file(&self, url: &str) -> Result<Vec<u8>>;
}

/// A message as returned by the surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMessage {
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SurfaceFile>,
}

/// File attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceFile {
    #[serde(default)]
    pub name: String,
    /// Slack file type, e.g. `png` or `python`
    #[serde(default)]
    pub filetype: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url_private: Option<String>,
}

impl SurfaceMessage {
    pub fn new(ts: impl Into<String>, user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            text: text.into(),
            user: Some(user.into()),
            ..Default::default()
        }
    }

    /// Seconds since the epoch encoded in the timestamp
    pub fn ts_seconds(&self) -> f64 {
        self.ts.parse().unwrap_or(0.0)
    }

    /// Whether the text mentions `user_id`
    pub fn mentions(&self, user_id: &str) -> bool {
        self.text.contains(&format!("<@{}>", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions() {
        let message = SurfaceMessage::new("1.0", "U1", "hey <@UBOT> help");
        assert!(message.mentions("UBOT"));
        assert!(!message.mentions("UOTHER"));
    }

    #[test]
    fn test_ts_seconds() {
        let message = SurfaceMessage::new("1700000000.000100", "U1", "");
        assert!((message.ts_seconds() - 1_700_000_000.0001).abs() < 1e-3);
        assert_eq!(SurfaceMessage::new("bogus", "U1", "").ts_seconds(), 0.0);
    }

    #[test]
    fn test_deserialize_slack_message() {
        let json = r#"{"type":"message","ts":"1.2","user":"U1","text":"hi","files":[{"name":"a.png","filetype":"png","mimetype":"image/png","size":3,"url_private":"https://files/a.png"}]}"#;
        let message: SurfaceMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.ts, "1.2");
        assert_eq!(message.files.len(), 1);
        assert_eq!(message.files[0].filetype.as_deref(), Some("png"));
        assert!(message.bot_id.is_none());
    }
}
