// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Incremental rendering of a reply onto the messaging surface
//!
//! A reply lives in one in-progress message. When the surface refuses the
//! text as too long, the reply is split into chunks: the first replaces the
//! in-progress message and the rest follow as thread replies. The target is
//! locked for the whole render so two flushes never post the same chunk.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chat::formatting::format_reply_for_slack;
use crate::chat::split::split;
use crate::error::{Result, SlaickError, SurfaceError};
use crate::slack::MessagingSurface;

/// Replies fetched when checking whether a newer message exists
const FRESHNESS_REPLY_LIMIT: usize = 1000;

/// The in-progress message and its chunk follow-ups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub channel: String,
    /// Thread the reply belongs to; chunk follow-ups are posted here
    pub thread_ts: Option<String>,
    /// The in-progress message
    pub message_id: String,
    /// Follow-up messages created once the reply was split, in order
    pub chunk_ids: Vec<String>,
    /// Unformatted text most recently rendered
    pub last_text: String,
}

impl RenderTarget {
    pub fn new(
        channel: impl Into<String>,
        thread_ts: Option<String>,
        message_id: impl Into<String>,
        initial_text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            thread_ts,
            message_id: message_id.into(),
            chunk_ids: Vec::new(),
            last_text: initial_text.into(),
        }
    }

    /// ID of the last message this reply occupies
    pub fn last_known_id(&self) -> &str {
        self.chunk_ids.last().unwrap_or(&self.message_id)
    }

    fn reply_thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.message_id)
    }
}

/// How text is prepared for the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub max_chunk_length: usize,
    /// Appended while the reply is still being written
    pub loading_suffix: String,
    pub translate_markdown: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_chunk_length: 3000,
            loading_suffix: " ... :writing_hand:".to_string(),
            translate_markdown: false,
        }
    }
}

/// Writes accumulated text to one render target.
///
/// Cloning is cheap; clones share the target.
#[derive(Clone)]
pub struct IncrementalRenderer {
    surface: Arc<dyn MessagingSurface>,
    target: Arc<Mutex<RenderTarget>>,
    options: Arc<RenderOptions>,
}

impl IncrementalRenderer {
    pub fn new(surface: Arc<dyn MessagingSurface>, target: RenderTarget, options: RenderOptions) -> Self {
        Self {
            surface,
            target: Arc::new(Mutex::new(target)),
            options: Arc::new(options),
        }
    }

    /// Snapshot of the target
    pub async fn target(&self) -> RenderTarget {
        self.target.lock().await.clone()
    }

    /// Render `text`, with the loading suffix unless `is_final`.
    pub async fn render(&self, text: &str, is_final: bool) -> Result<()> {
        let mut target = self.target.lock().await;
        let formatted = format_reply_for_slack(text, self.options.translate_markdown);
        let suffix = if is_final {
            ""
        } else {
            self.options.loading_suffix.as_str()
        };

        if target.chunk_ids.is_empty() {
            let body = format!("{}{}", formatted, suffix);
            match self
                .surface
                .update_message(&target.channel, &target.message_id, &body)
                .await
            {
                Ok(()) => {
                    target.last_text = text.to_string();
                    return Ok(());
                }
                Err(SlaickError::Surface(SurfaceError::MessageTooLong)) => {
                    tracing::info!(
                        target: "slaick.chat.render",
                        chars = formatted.chars().count(),
                        "message too long, splitting into chunks"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.render_chunks(&mut target, &formatted, suffix, is_final)
            .await?;
        target.last_text = text.to_string();
        Ok(())
    }

    async fn render_chunks(
        &self,
        target: &mut RenderTarget,
        formatted: &str,
        suffix: &str,
        is_final: bool,
    ) -> Result<()> {
        let chunks = split(formatted, self.options.max_chunk_length);
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            let body = if !is_final && (i == 0 || i + 1 < total) {
                format!("{}{}", chunk, suffix)
            } else {
                chunk.clone()
            };

            if i == 0 {
                self.surface
                    .update_message(&target.channel, &target.message_id, &body)
                    .await?;
            } else if let Some(id) = target.chunk_ids.get(i - 1) {
                self.surface
                    .update_message(&target.channel, id, &body)
                    .await?;
            } else {
                let id = self
                    .surface
                    .post_message(&target.channel, &body, Some(target.reply_thread()))
                    .await?;
                target.chunk_ids.push(id);
            }
        }

        // Text can shrink when a function call restarts the reply.
        let keep = total.saturating_sub(1);
        while target.chunk_ids.len() > keep {
            if let Some(id) = target.chunk_ids.pop() {
                delete_ignoring_missing(self.surface.as_ref(), &target.channel, &id).await?;
            }
        }

        tracing::debug!(
            target: "slaick.chat.render",
            chunks = total,
            is_final,
            "rendered reply in chunks"
        );
        Ok(())
    }

    /// Whether this reply is still the newest message in its thread.
    ///
    /// This is a check-then-act: a reply posted after the check is not seen.
    pub async fn is_latest(&self) -> Result<bool> {
        let target = self.target.lock().await;
        let replies = self
            .surface
            .fetch_thread_replies(&target.channel, target.reply_thread(), FRESHNESS_REPLY_LIMIT)
            .await?;
        Ok(replies
            .last()
            .map_or(true, |latest| latest.ts == target.last_known_id()))
    }

    /// Delete the reply and all of its chunks.
    pub async fn discard(&self) -> Result<()> {
        let mut target = self.target.lock().await;
        let channel = target.channel.clone();
        for id in std::mem::take(&mut target.chunk_ids) {
            delete_ignoring_missing(self.surface.as_ref(), &channel, &id).await?;
        }
        delete_ignoring_missing(self.surface.as_ref(), &channel, &target.message_id).await?;
        tracing::info!(
            target: "slaick.chat.render",
            message_id = %target.message_id,
            "discarded superseded reply"
        );
        Ok(())
    }

    /// Remember `text` as the reply's current text without rendering it.
    pub async fn record_text(&self, text: &str) {
        self.target.lock().await.last_text = text.to_string();
    }

    /// Append a notice after the reply's current text.
    pub async fn append_notice(&self, notice: &str) -> Result<()> {
        let current = self.target.lock().await.last_text.clone();
        let text = if current.is_empty() {
            notice.to_string()
        } else {
            format!("{}\n\n{}", current, notice)
        };
        self.render(&text, true).await
    }

    /// Replace the reply with a notice.
    pub async fn replace_with_notice(&self, notice: &str) -> Result<()> {
        self.render(notice, true).await
    }
}

async fn delete_ignoring_missing(
    surface: &dyn MessagingSurface,
    channel: &str,
    id: &str,
) -> Result<()> {
    match surface.delete_message(channel, id).await {
        Ok(()) | Err(SlaickError::Surface(SurfaceError::MessageNotFound(_))) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::memory::{InMemorySurface, SurfaceOp};

    const SUFFIX: &str = " ... :writing_hand:";

    async fn setup(max_length: usize, max_chunk: usize) -> (Arc<InMemorySurface>, IncrementalRenderer, String) {
        let surface = Arc::new(InMemorySurface::new().with_max_length(max_length));
        let root = surface.post_message("C1", "question", None).await.unwrap();
        let wip = surface.post_message("C1", "loading", Some(&root)).await.unwrap();
        let renderer = IncrementalRenderer::new(
            surface.clone(),
            RenderTarget::new("C1", Some(root), wip.clone(), "loading"),
            RenderOptions {
                max_chunk_length: max_chunk,
                ..Default::default()
            },
        );
        (surface, renderer, wip)
    }

    #[tokio::test]
    async fn test_render_appends_suffix_until_final() {
        let (surface, renderer, wip) = setup(1000, 100).await;
        renderer.render("Hello", false).await.unwrap();
        assert_eq!(surface.message_text("C1", &wip).unwrap(), format!("Hello{}", SUFFIX));

        renderer.render("Hello world", true).await.unwrap();
        assert_eq!(surface.message_text("C1", &wip).unwrap(), "Hello world");
        assert_eq!(renderer.target().await.last_text, "Hello world");
    }

    #[tokio::test]
    async fn test_too_long_splits_into_thread_chunks() {
        let (surface, renderer, wip) = setup(60, 30).await;
        let text = format!("{}\n{}\n{}", "a".repeat(25), "b".repeat(25), "c".repeat(25));

        renderer.render(&text, false).await.unwrap();
        let target = renderer.target().await;
        assert_eq!(target.chunk_ids.len(), 2);
        assert_eq!(
            surface.message_text("C1", &wip).unwrap(),
            format!("{}{}", "a".repeat(25), SUFFIX)
        );
        assert_eq!(
            surface.message_text("C1", &target.chunk_ids[0]).unwrap(),
            format!("{}{}", "b".repeat(25), SUFFIX)
        );
        // The last chunk never carries the suffix
        assert_eq!(
            surface.message_text("C1", &target.chunk_ids[1]).unwrap(),
            "c".repeat(25)
        );
    }

    #[tokio::test]
    async fn test_final_render_reuses_chunks() {
        let (surface, renderer, wip) = setup(60, 30).await;
        let text = format!("{}\n{}", "a".repeat(25), "b".repeat(25));

        renderer.render(&text, false).await.unwrap();
        renderer.render(&text, true).await.unwrap();

        let target = renderer.target().await;
        assert_eq!(target.chunk_ids.len(), 1);
        assert_eq!(surface.message_text("C1", &wip).unwrap(), "a".repeat(25));
        assert_eq!(
            surface.message_text("C1", &target.chunk_ids[0]).unwrap(),
            "b".repeat(25)
        );
        let posts = surface
            .ops()
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Post { .. }))
            .count();
        assert_eq!(posts, 3);
    }

    #[tokio::test]
    async fn test_shrinking_text_deletes_extra_chunks() {
        let (surface, renderer, wip) = setup(60, 30).await;
        let long = format!("{}\n{}", "a".repeat(25), "b".repeat(25));
        renderer.render(&long, false).await.unwrap();
        let chunk = renderer.target().await.chunk_ids[0].clone();

        renderer.render("short", true).await.unwrap();
        assert!(renderer.target().await.chunk_ids.is_empty());
        assert!(surface.message_text("C1", &chunk).is_none());
        assert_eq!(surface.message_text("C1", &wip).unwrap(), "short");
    }

    #[tokio::test]
    async fn test_is_latest_and_discard() {
        let (surface, renderer, wip) = setup(1000, 100).await;
        assert!(renderer.is_latest().await.unwrap());

        let root = renderer.target().await.thread_ts.unwrap();
        surface.inject_reply("C1", &root, "U2", "newer question");
        assert!(!renderer.is_latest().await.unwrap());

        renderer.discard().await.unwrap();
        assert!(surface.message_text("C1", &wip).is_none());
    }

    #[tokio::test]
    async fn test_is_latest_tracks_last_chunk() {
        let (_surface, renderer, _wip) = setup(60, 30).await;
        let text = format!("{}\n{}", "a".repeat(25), "b".repeat(25));
        renderer.render(&text, false).await.unwrap();
        assert!(renderer.is_latest().await.unwrap());
    }

    #[tokio::test]
    async fn test_append_notice_keeps_partial_text() {
        let (surface, renderer, wip) = setup(1000, 100).await;
        renderer.render("partial", false).await.unwrap();
        renderer.append_notice(":warning: timeout").await.unwrap();
        assert_eq!(
            surface.message_text("C1", &wip).unwrap(),
            "partial\n\n:warning: timeout"
        );
    }

    #[tokio::test]
    async fn test_append_notice_after_loading_text() {
        let (surface, renderer, wip) = setup(1000, 100).await;
        renderer.append_notice(":warning: failed").await.unwrap();
        assert_eq!(
            surface.message_text("C1", &wip).unwrap(),
            "loading\n\n:warning: failed"
        );
    }

    #[tokio::test]
    async fn test_replace_with_notice() {
        let (surface, renderer, wip) = setup(1000, 100).await;
        renderer.render("partial", false).await.unwrap();
        renderer.replace_with_notice(":warning: too long").await.unwrap();
        assert_eq!(surface.message_text("C1", &wip).unwrap(), ":warning: too long");
    }

    #[tokio::test]
    async fn test_other_surface_errors_propagate() {
        let surface = Arc::new(InMemorySurface::new());
        let renderer = IncrementalRenderer::new(
            surface,
            RenderTarget::new("C1", None, "missing", ""),
            RenderOptions::default(),
        );
        let err = renderer.render("x", true).await.unwrap_err();
        assert!(matches!(
            err,
            SlaickError::Surface(SurfaceError::MessageNotFound(_))
        ));
    }
}
