// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stream consumption
//!
//! Reads deltas until the stream ends or the turn deadline passes, flushing
//! in-progress text every few content deltas. Every exit path waits for the
//! outstanding flushes first, so a late background flush can never
//! overwrite the final text.

use futures::StreamExt;
use tokio::time::Instant;

use crate::chat::flush::FlushScheduler;
use crate::chat::render::IncrementalRenderer;
use crate::error::{Result, SlaickError};
use crate::llm::{DeltaStream, FunctionCall, StreamDelta};

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The reply was rendered in full
    Completed(String),
    /// A newer message arrived; the reply was deleted
    Superseded,
    /// The model asked for a function call
    FunctionCall(FunctionCall),
}

/// Text and function call accumulated from one stream
#[derive(Debug, Default)]
struct StreamState {
    accumulated_text: String,
    function_call: Option<FunctionCall>,
    deltas_since_flush: usize,
}

impl StreamState {
    fn apply(&mut self, delta: StreamDelta) -> bool {
        match delta {
            StreamDelta::Content(text) => {
                self.accumulated_text.push_str(&text);
                self.deltas_since_flush += 1;
                true
            }
            StreamDelta::FunctionCall { name, arguments } => {
                // A function call only counts when it opens the response.
                if !self.accumulated_text.is_empty() {
                    tracing::debug!(
                        target: "slaick.chat.stream",
                        "ignoring function-call delta after content"
                    );
                    return false;
                }
                let call = self
                    .function_call
                    .get_or_insert_with(|| FunctionCall::new("", ""));
                if let Some(name) = name {
                    call.name.push_str(&name);
                }
                if let Some(arguments) = arguments {
                    call.arguments.push_str(&arguments);
                }
                false
            }
        }
    }
}

/// Drives one delta stream onto a renderer
pub struct StreamConsumer {
    renderer: IncrementalRenderer,
    flush_every: usize,
    flush_concurrency: usize,
}

impl StreamConsumer {
    pub fn new(renderer: IncrementalRenderer, flush_every: usize, flush_concurrency: usize) -> Self {
        Self {
            renderer,
            flush_every: flush_every.max(1),
            flush_concurrency,
        }
    }

    /// Consume `stream` until it ends or `deadline` passes.
    ///
    /// `started` is the start of the turn and only feeds the timeout error.
    pub async fn consume(
        &self,
        mut stream: DeltaStream,
        deadline: Instant,
        started: Instant,
    ) -> Result<StreamOutcome> {
        let mut state = StreamState::default();
        let mut flushes = FlushScheduler::new(self.renderer.clone(), self.flush_concurrency);

        let drained = self
            .drain(&mut stream, deadline, started, &mut state, &mut flushes)
            .await;
        flushes.join_all().await;
        if let Err(e) = drained {
            if !state.accumulated_text.is_empty() {
                self.renderer.record_text(&state.accumulated_text).await;
            }
            return Err(e);
        }

        if let Some(call) = state.function_call.filter(|call| !call.name.is_empty()) {
            tracing::info!(
                target: "slaick.chat.stream",
                function = %call.name,
                "model requested a function call"
            );
            return Ok(StreamOutcome::FunctionCall(call));
        }

        if !self.renderer.is_latest().await? {
            self.renderer.discard().await?;
            return Ok(StreamOutcome::Superseded);
        }

        self.renderer.render(&state.accumulated_text, true).await?;
        Ok(StreamOutcome::Completed(state.accumulated_text))
    }

    async fn drain(
        &self,
        stream: &mut DeltaStream,
        deadline: Instant,
        started: Instant,
        state: &mut StreamState,
        flushes: &mut FlushScheduler,
    ) -> Result<()> {
        loop {
            let next = tokio::time::timeout_at(deadline, stream.next())
                .await
                .map_err(|_| SlaickError::StreamTimeout {
                    elapsed: started.elapsed(),
                })?;

            let Some(delta) = next else {
                return Ok(());
            };

            if state.apply(delta?) && state.deltas_since_flush >= self.flush_every {
                state.deltas_since_flush = 0;
                flushes.schedule(state.accumulated_text.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::render::{RenderOptions, RenderTarget};
    use crate::error::ApiError;
    use crate::slack::{InMemorySurface, MessagingSurface};
    use std::sync::Arc;
    use std::time::Duration;

    async fn consumer(surface: Arc<InMemorySurface>, flush_every: usize) -> (StreamConsumer, String, String) {
        let root = surface.post_message("C1", "question", None).await.unwrap();
        let wip = surface.post_message("C1", "loading", Some(&root)).await.unwrap();
        let renderer = IncrementalRenderer::new(
            surface,
            RenderTarget::new("C1", Some(root.clone()), wip.clone(), "loading"),
            RenderOptions::default(),
        );
        (StreamConsumer::new(renderer, flush_every, 2), root, wip)
    }

    fn stream_of(deltas: Vec<Result<StreamDelta>>) -> DeltaStream {
        Box::pin(futures::stream::iter(deltas))
    }

    #[test]
    fn test_function_call_only_before_content() {
        let mut state = StreamState::default();
        state.apply(StreamDelta::FunctionCall {
            name: Some("get_".to_string()),
            arguments: None,
        });
        state.apply(StreamDelta::FunctionCall {
            name: Some("time".to_string()),
            arguments: Some("{}".to_string()),
        });
        assert_eq!(state.function_call, Some(FunctionCall::new("get_time", "{}")));

        let mut state = StreamState::default();
        state.apply(StreamDelta::content("hi"));
        state.apply(StreamDelta::function_call("late", "{}"));
        assert!(state.function_call.is_none());
        assert_eq!(state.accumulated_text, "hi");
    }

    #[tokio::test]
    async fn test_completed_stream_renders_final_text() {
        let surface = Arc::new(InMemorySurface::new());
        let (consumer, _root, wip) = consumer(surface.clone(), 2).await;
        let stream = stream_of(vec![
            Ok(StreamDelta::content("a")),
            Ok(StreamDelta::content("b")),
            Ok(StreamDelta::content("c")),
        ]);

        let now = Instant::now();
        let outcome = consumer
            .consume(stream, now + Duration::from_secs(5), now)
            .await
            .unwrap();
        assert_eq!(outcome, StreamOutcome::Completed("abc".to_string()));
        assert_eq!(surface.message_text("C1", &wip).unwrap(), "abc");
        assert_eq!(surface.texts_for(&wip).last().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_function_call_outcome_skips_final_render() {
        let surface = Arc::new(InMemorySurface::new());
        let (consumer, _root, wip) = consumer(surface.clone(), 20).await;
        let stream = stream_of(vec![
            Ok(StreamDelta::FunctionCall {
                name: Some("current_time".to_string()),
                arguments: Some("{\"tz\":".to_string()),
            }),
            Ok(StreamDelta::FunctionCall {
                name: None,
                arguments: Some("\"UTC\"}".to_string()),
            }),
        ]);

        let now = Instant::now();
        let outcome = consumer
            .consume(stream, now + Duration::from_secs(5), now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StreamOutcome::FunctionCall(FunctionCall::new("current_time", "{\"tz\":\"UTC\"}"))
        );
        assert_eq!(surface.message_text("C1", &wip).unwrap(), "loading");
    }

    #[tokio::test]
    async fn test_superseded_reply_is_discarded() {
        let surface = Arc::new(InMemorySurface::new());
        let (consumer, root, wip) = consumer(surface.clone(), 20).await;
        surface.inject_reply("C1", &root, "U2", "actually, never mind");

        let now = Instant::now();
        let outcome = consumer
            .consume(
                stream_of(vec![Ok(StreamDelta::content("late answer"))]),
                now + Duration::from_secs(5),
                now,
            )
            .await
            .unwrap();
        assert_eq!(outcome, StreamOutcome::Superseded);
        assert!(surface.message_text("C1", &wip).is_none());
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let surface = Arc::new(InMemorySurface::new());
        let (consumer, _root, _wip) = consumer(surface, 20).await;
        let stream = stream_of(vec![
            Ok(StreamDelta::content("a")),
            Err(ApiError::StreamError("reset".to_string()).into()),
        ]);

        let now = Instant::now();
        let err = consumer
            .consume(stream, now + Duration::from_secs(5), now)
            .await
            .unwrap_err();
        assert!(matches!(err, SlaickError::Api(ApiError::StreamError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_timeout() {
        let surface = Arc::new(InMemorySurface::new());
        let (consumer, _root, _wip) = consumer(surface, 20).await;
        let stream: DeltaStream = Box::pin(futures::stream::pending());

        let now = Instant::now();
        let err = consumer
            .consume(stream, now + Duration::from_secs(3), now)
            .await
            .unwrap_err();
        match err {
            SlaickError::StreamTimeout { elapsed } => assert!(elapsed >= Duration::from_secs(3)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
