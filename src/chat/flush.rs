// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Background flushes of in-progress text
//!
//! At most `concurrency` flushes run at once. A flush requested while every
//! slot is busy is dropped: the next flush (or the final render) carries
//! all text accumulated so far.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chat::render::IncrementalRenderer;
use crate::error::Result;

/// Counts reported by [`FlushScheduler::join_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Launches non-final renders without blocking the stream
pub struct FlushScheduler {
    renderer: IncrementalRenderer,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<()>>,
    skipped: usize,
}

impl FlushScheduler {
    pub fn new(renderer: IncrementalRenderer, concurrency: usize) -> Self {
        Self {
            renderer,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            skipped: 0,
        }
    }

    /// Start a flush of `text`. Returns false when it was coalesced away.
    pub fn schedule(&mut self, text: String) -> bool {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.skipped += 1;
                tracing::trace!(target: "slaick.chat.flush", "all flush slots busy, skipping");
                return false;
            }
        };

        let renderer = self.renderer.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            renderer.render(&text, false).await
        });
        true
    }

    /// Flushes started and not yet joined
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every outstanding flush. Failures are logged, not returned.
    pub async fn join_all(&mut self) -> FlushStats {
        let mut stats = FlushStats {
            skipped: self.skipped,
            ..Default::default()
        };

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => stats.completed += 1,
                Ok(Err(e)) => {
                    stats.failed += 1;
                    tracing::warn!(target: "slaick.chat.flush", error = %e, "background flush failed");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(target: "slaick.chat.flush", error = %e, "background flush task panicked");
                }
            }
        }

        tracing::debug!(
            target: "slaick.chat.flush",
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "flushes joined"
        );
        self.skipped = 0;
        stats
    }
}
