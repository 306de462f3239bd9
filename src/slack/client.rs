// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Slack Web API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SurfaceError};

use super::{MessagingSurface, SurfaceMessage};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest page Slack returns for history and replies
const MAX_PAGE_SIZE: usize = 1000;

/// Messaging surface backed by the Slack Web API
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    bot_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    messages: Vec<SurfaceMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

/// The bot's own identifiers, as reported by `auth.test`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl Envelope {
    fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .map(|m| m.next_cursor.as_str())
            .filter(|cursor| !cursor.is_empty())
    }
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            bot_token: bot_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at another API root, e.g. a test server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Look up the bot's user ID and bot ID
    pub async fn auth_test(&self) -> Result<BotIdentity> {
        let envelope = self.post("auth.test", json!({}), None).await?;
        let user_id = envelope
            .user_id
            .ok_or_else(|| SurfaceError::Api("auth.test returned no user_id".to_string()))?;
        Ok(BotIdentity {
            user_id,
            bot_id: envelope.bot_id,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn post(&self, method: &str, body: Value, message_id: Option<&str>) -> Result<Envelope> {
        tracing::debug!(target: "slaick.slack", method, "calling Slack API");
        let response = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.bot_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        check(method, response, message_id).await
    }

    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<Envelope> {
        tracing::debug!(target: "slaick.slack", method, "calling Slack API");
        let response = self
            .client
            .get(self.method_url(method))
            .bearer_auth(&self.bot_token)
            .timeout(REQUEST_TIMEOUT)
            .query(query)
            .send()
            .await?;
        check(method, response, None).await
    }
}

async fn check(method: &str, response: reqwest::Response, message_id: Option<&str>) -> Result<Envelope> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SurfaceError::Api(format!("{} failed ({}): {}", method, status, body)).into());
    }

    let envelope: Envelope = response.json().await?;
    if envelope.ok {
        return Ok(envelope);
    }

    let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
    tracing::warn!(target: "slaick.slack", method, error = %error, "Slack API call failed");
    Err(match (error.as_str(), message_id) {
        ("msg_too_long", _) => SurfaceError::MessageTooLong,
        ("message_not_found", Some(id)) => SurfaceError::MessageNotFound(id.to_string()),
        _ => SurfaceError::Api(format!("{}: {}", method, error)),
    }
    .into())
}

#[async_trait]
impl MessagingSurface for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String> {
        let mut body = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }
        let envelope = self.post("chat.postMessage", body, None).await?;
        envelope.ts.ok_or_else(|| {
            SurfaceError::Api("chat.postMessage returned no ts".to_string()).into()
        })
    }

    async fn update_message(&self, channel: &str, message_id: &str, text: &str) -> Result<()> {
        let body = json!({
            "channel": channel,
            "ts": message_id,
            "text": text,
        });
        self.post("chat.update", body, Some(message_id)).await?;
        Ok(())
    }

    async fn fetch_history(&self, channel: &str, limit: usize) -> Result<Vec<SurfaceMessage>> {
        let envelope = self
            .get(
                "conversations.history",
                &[
                    ("channel", channel.to_string()),
                    ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
                ],
            )
            .await?;
        let mut messages = envelope.messages;
        messages.truncate(limit);
        Ok(messages)
    }

    async fn fetch_thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<SurfaceMessage>> {
        let mut messages: Vec<SurfaceMessage> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("channel", channel.to_string()),
                ("ts", thread_ts.to_string()),
                ("limit", (limit - messages.len()).min(MAX_PAGE_SIZE).to_string()),
            ];
            if let Some(ref cursor) = cursor {
                query.push(("cursor", cursor.clone()));
            }

            let envelope = self.get("conversations.replies", &query).await?;
            cursor = envelope.next_cursor().map(str::to_string);
            messages.extend(envelope.messages);

            if messages.len() >= limit || cursor.is_none() {
                break;
            }
        }

        messages.truncate(limit);
        Ok(messages)
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()> {
        let body = json!({
            "channel": channel,
            "ts": message_id,
        });
        self.post("chat.delete", body, Some(message_id)).await?;
        Ok(())
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bot_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SurfaceError::Api(format!(
                "Request to {} failed with status code {}",
                url,
                status.as_u16()
            ))
            .into());
        }

        // Slack answers with a login page when the token lacks files:read.
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/html"));
        if is_html {
            return Err(SurfaceError::Api(format!(
                "You don't have the permission to download this file: {}",
                url
            ))
            .into());
        }

        Ok(response.bytes().await?.to_vec())
    }
}
