// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! In-memory messaging surface
//!
//! Behaves like a single Slack workspace: it enforces a message length
//! limit, keeps threads, and records every successful operation so tests can
//! assert on what a reply looked like over time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SurfaceError};

use super::{MessagingSurface, SurfaceMessage};

/// A recorded surface operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Post {
        channel: String,
        thread_ts: Option<String>,
        id: String,
        text: String,
    },
    Update {
        channel: String,
        id: String,
        text: String,
    },
    Delete {
        channel: String,
        id: String,
    },
}

#[derive(Debug, Default)]
struct State {
    /// Messages per channel
    channels: HashMap<String, Vec<SurfaceMessage>>,
    ops: Vec<SurfaceOp>,
    files: HashMap<String, Vec<u8>>,
}

/// Messaging surface held entirely in memory
#[derive(Debug)]
pub struct InMemorySurface {
    state: Mutex<State>,
    max_length: Option<usize>,
    update_delay: Duration,
    next_ts: AtomicU64,
    rejected_updates: AtomicUsize,
    in_flight_updates: AtomicUsize,
    peak_in_flight_updates: AtomicUsize,
    bot_user_id: String,
}

impl Default for InMemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySurface {
    /// Create a surface without a length limit
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_length: None,
            update_delay: Duration::ZERO,
            next_ts: AtomicU64::new(1),
            rejected_updates: AtomicUsize::new(0),
            in_flight_updates: AtomicUsize::new(0),
            peak_in_flight_updates: AtomicUsize::new(0),
            bot_user_id: "UBOT".to_string(),
        }
    }

    /// Reject posts and updates longer than `max_length` characters
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Make every update take this long
    pub fn with_update_delay(mut self, delay: Duration) -> Self {
        self.update_delay = delay;
        self
    }

    /// User ID recorded as the author of posted messages
    pub fn with_bot_user_id(mut self, bot_user_id: impl Into<String>) -> Self {
        self.bot_user_id = bot_user_id.into();
        self
    }

    /// Add an existing message to a channel
    pub fn add_message(&self, channel: &str, message: SurfaceMessage) {
        self.state()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(message);
    }

    /// Simulate someone replying in a thread; returns the new message ID
    pub fn inject_reply(&self, channel: &str, thread_ts: &str, user: &str, text: &str) -> String {
        let ts = self.allocate_ts();
        let mut message = SurfaceMessage::new(ts.clone(), user, text);
        message.thread_ts = Some(thread_ts.to_string());
        self.add_message(channel, message);
        ts
    }

    /// Make a file downloadable at `url`
    pub fn add_file(&self, url: &str, data: Vec<u8>) {
        self.state().files.insert(url.to_string(), data);
    }

    /// Every successful operation in order
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.state().ops.clone()
    }

    /// Texts written to `id`, by post or update, in order
    pub fn texts_for(&self, id: &str) -> Vec<String> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::Post { id: op_id, text, .. } | SurfaceOp::Update { id: op_id, text, .. }
                    if op_id == id =>
                {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Current text of a message, if it still exists
    pub fn message_text(&self, channel: &str, id: &str) -> Option<String> {
        self.state()
            .channels
            .get(channel)
            .and_then(|messages| messages.iter().find(|m| m.ts == id))
            .map(|m| m.text.clone())
    }

    /// Number of updates rejected for length
    pub fn rejected_updates(&self) -> usize {
        self.rejected_updates.load(Ordering::SeqCst)
    }

    /// Largest number of updates that were running at the same time
    pub fn peak_concurrent_updates(&self) -> usize {
        self.peak_in_flight_updates.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("In-memory surface lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn allocate_ts(&self) -> String {
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst);
        format!("1700000000.{:06}", n)
    }

    fn too_long(&self, text: &str) -> bool {
        self.max_length
            .is_some_and(|max| text.chars().count() > max)
    }
}

fn sort_by_ts(messages: &mut [SurfaceMessage]) {
    messages.sort_by(|a, b| {
        a.ts_seconds()
            .partial_cmp(&b.ts_seconds())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ts.cmp(&b.ts))
    });
}

#[async_trait]
impl MessagingSurface for InMemorySurface {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String> {
        if self.too_long(text) {
            return Err(SurfaceError::MessageTooLong.into());
        }
        let ts = self.allocate_ts();
        let mut message = SurfaceMessage::new(ts.clone(), self.bot_user_id.clone(), text);
        message.thread_ts = thread_ts.map(str::to_string);

        let mut state = self.state();
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(message);
        state.ops.push(SurfaceOp::Post {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            id: ts.clone(),
            text: text.to_string(),
        });
        Ok(ts)
    }

    async fn update_message(&self, channel: &str, message_id: &str, text: &str) -> Result<()> {
        let in_flight = self.in_flight_updates.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight_updates
            .fetch_max(in_flight, Ordering::SeqCst);
        if !self.update_delay.is_zero() {
            tokio::time::sleep(self.update_delay).await;
        }
        self.in_flight_updates.fetch_sub(1, Ordering::SeqCst);

        if self.too_long(text) {
            self.rejected_updates.fetch_add(1, Ordering::SeqCst);
            return Err(SurfaceError::MessageTooLong.into());
        }

        let mut state = self.state();
        let message = state
            .channels
            .get_mut(channel)
            .and_then(|messages| messages.iter_mut().find(|m| m.ts == message_id))
            .ok_or_else(|| SurfaceError::MessageNotFound(message_id.to_string()))?;
        message.text = text.to_string();
        state.ops.push(SurfaceOp::Update {
            channel: channel.to_string(),
            id: message_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_history(&self, channel: &str, limit: usize) -> Result<Vec<SurfaceMessage>> {
        let mut messages: Vec<SurfaceMessage> = self
            .state()
            .channels
            .get(channel)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.thread_ts.as_deref().map_or(true, |t| t == m.ts))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_by_ts(&mut messages);
        messages.reverse();
        messages.truncate(limit);
        Ok(messages)
    }

    async fn fetch_thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<SurfaceMessage>> {
        let mut messages: Vec<SurfaceMessage> = self
            .state()
            .channels
            .get(channel)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.ts == thread_ts || m.thread_ts.as_deref() == Some(thread_ts))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_by_ts(&mut messages);
        messages.truncate(limit);
        Ok(messages)
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<()> {
        let mut state = self.state();
        let messages = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| SurfaceError::MessageNotFound(message_id.to_string()))?;
        let index = messages
            .iter()
            .position(|m| m.ts == message_id)
            .ok_or_else(|| SurfaceError::MessageNotFound(message_id.to_string()))?;
        messages.remove(index);
        state.ops.push(SurfaceOp::Delete {
            channel: channel.to_string(),
            id: message_id.to_string(),
        });
        Ok(())
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        self.state()
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| SurfaceError::Api(format!("file not found: {}", url)).into())
    }
}
