// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Incoming Slack events and the rules deciding which ones get a reply

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{MessagingSurface, SurfaceFile, SurfaceMessage};

/// Message subtypes that never get a reply
pub const SKIPPED_SUBTYPES: &[&str] = &["message_changed", "message_deleted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AppMention,
    Message,
}

/// A message event as delivered by Slack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SurfaceFile>,
}

impl IncomingMessage {
    /// A plain `message` event
    pub fn message(channel: impl Into<String>, user: impl Into<String>, ts: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Message,
            channel: channel.into(),
            channel_type: None,
            user: Some(user.into()),
            ts: ts.into(),
            thread_ts: None,
            text: text.into(),
            bot_id: None,
            subtype: None,
            files: Vec::new(),
        }
    }

    /// Direct message or multi-person direct message
    pub fn is_dm(&self) -> bool {
        matches!(self.channel_type.as_deref(), Some("im" | "mpim"))
    }

    pub fn is_new_conversation(&self) -> bool {
        self.thread_ts.is_none()
    }

    /// Thread the reply goes into
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// The event as a surface message, for context building
    pub fn to_surface_message(&self) -> SurfaceMessage {
        SurfaceMessage {
            ts: self.ts.clone(),
            text: self.text.clone(),
            user: self.user.clone(),
            bot_id: self.bot_id.clone(),
            thread_ts: self.thread_ts.clone(),
            subtype: self.subtype.clone(),
            files: self.files.clone(),
        }
    }
}

/// Whether an event gets a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Process,
    Skip(&'static str),
}

/// Decides which events the bot answers
#[derive(Debug, Clone)]
pub struct EventGate {
    bot_user_id: String,
    bot_id: Option<String>,
}

impl EventGate {
    pub fn new(bot_user_id: impl Into<String>, bot_id: Option<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            bot_id,
        }
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    fn mentions_bot(&self, text: &str) -> bool {
        text.contains(&format!("<@{}>", self.bot_user_id))
    }

    /// Whether the thread's parent message mentions the bot
    async fn parent_mentions_bot(
        &self,
        surface: &dyn MessagingSurface,
        channel: &str,
        thread_ts: &str,
    ) -> Result<bool> {
        let replies = surface.fetch_thread_replies(channel, thread_ts, 1).await?;
        Ok(replies
            .first()
            .is_some_and(|parent| parent.mentions(&self.bot_user_id)))
    }

    pub async fn evaluate(
        &self,
        surface: &dyn MessagingSurface,
        event: &IncomingMessage,
    ) -> Result<GateDecision> {
        if let Some(subtype) = event.subtype.as_deref() {
            if SKIPPED_SUBTYPES.contains(&subtype) {
                return Ok(GateDecision::Skip("edited or deleted message"));
            }
        }
        if event.user.as_deref() == Some(self.bot_user_id.as_str()) {
            return Ok(GateDecision::Skip("own message"));
        }

        let decision = match event.kind {
            EventKind::AppMention => match event.thread_ts.as_deref() {
                // The message event handles threads that already mention the bot.
                Some(thread_ts)
                    if self
                        .parent_mentions_bot(surface, &event.channel, thread_ts)
                        .await? =>
                {
                    GateDecision::Skip("thread handled by message event")
                }
                _ => GateDecision::Process,
            },
            EventKind::Message => {
                if event.bot_id.is_some() && event.bot_id != self.bot_id {
                    GateDecision::Skip("message from another bot")
                } else if event.is_dm() {
                    GateDecision::Process
                } else if let Some(thread_ts) = event.thread_ts.as_deref() {
                    if self
                        .parent_mentions_bot(surface, &event.channel, thread_ts)
                        .await?
                    {
                        GateDecision::Process
                    } else {
                        GateDecision::Skip("thread does not mention the bot")
                    }
                } else {
                    GateDecision::Skip("channel message without mention")
                }
            }
        };

        // Outside DMs and threads only mentions get a reply.
        if decision == GateDecision::Process
            && !event.is_dm()
            && event.thread_ts.is_none()
            && !self.mentions_bot(&event.text)
        {
            return Ok(GateDecision::Skip("channel message without mention"));
        }

        tracing::debug!(
            target: "slaick.slack",
            channel = %event.channel,
            ts = %event.ts,
            ?decision,
            "gated event"
        );
        Ok(decision)
    }
}
