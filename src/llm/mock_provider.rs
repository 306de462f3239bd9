// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted completion provider for testing
//!
//! Replays pre-configured delta sequences so the streaming pipeline can be
//! exercised without network calls. Delays use `tokio::time`, so tests with a
//! paused clock run instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ApiError, Result, SlaickError};
use crate::llm::provider::{
    CompletionProvider, CompletionRequest, DeltaStream, ModelInfo, StreamDelta,
};

/// A provider that replays scripts, one per `complete_stream` call
#[derive(Clone)]
pub struct ScriptedProvider {
    /// Provider name
    name: String,
    /// Queued scripts; the last one repeats once the queue runs dry
    scripts: Arc<Mutex<Vec<Script>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Known models
    models: Vec<ModelInfo>,
}

/// One scripted response stream
#[derive(Clone, Debug, Default)]
pub struct Script {
    /// Deltas with the delay before each one
    pub steps: Vec<(Duration, StreamDelta)>,
    /// What happens after the last step
    pub ending: ScriptEnding,
}

/// How a scripted stream finishes
#[derive(Clone, Debug, Default)]
pub enum ScriptEnding {
    /// The stream ends normally
    #[default]
    Complete,
    /// The stream never yields again
    Hang,
    /// The stream yields an error
    Fail(String),
    /// Opening the stream fails before any delta
    Reject(String),
}

impl Script {
    /// Content deltas delivered without delay
    pub fn text(deltas: &[&str]) -> Self {
        Self {
            steps: deltas
                .iter()
                .map(|d| (Duration::ZERO, StreamDelta::content(*d)))
                .collect(),
            ending: ScriptEnding::Complete,
        }
    }

    /// A function call split into a name delta and argument fragments
    pub fn function_call(name: &str, argument_fragments: &[&str]) -> Self {
        let mut steps = vec![(
            Duration::ZERO,
            StreamDelta::FunctionCall {
                name: Some(name.to_string()),
                arguments: None,
            },
        )];
        steps.extend(argument_fragments.iter().map(|fragment| {
            (
                Duration::ZERO,
                StreamDelta::FunctionCall {
                    name: None,
                    arguments: Some(fragment.to_string()),
                },
            )
        }));
        Self {
            steps,
            ending: ScriptEnding::Complete,
        }
    }

    /// Append a delta after a delay
    pub fn then(mut self, delay: Duration, delta: StreamDelta) -> Self {
        self.steps.push((delay, delta));
        self
    }

    /// Change how the stream ends
    pub fn ending(mut self, ending: ScriptEnding) -> Self {
        self.ending = ending;
        self
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Create a provider that streams an empty reply
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            scripts: Arc::new(Mutex::new(vec![Script::default()])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(Vec::new())),
            models: vec![Self::default_model()],
        }
    }

    fn default_model() -> ModelInfo {
        ModelInfo {
            id: "scripted-model".to_string(),
            display_name: "Scripted Model".to_string(),
            context_window: 8192,
            max_output_tokens: 1024,
            supports_functions: true,
            supports_vision: false,
        }
    }

    /// Queue scripts (returned in order)
    pub fn with_scripts(self, scripts: Vec<Script>) -> Self {
        *lock(&self.scripts) = scripts;
        self
    }

    /// Replace the model table
    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Get the number of times complete_stream() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    fn next_script(&self) -> Script {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let scripts = lock(&self.scripts);
        if scripts.is_empty() {
            Script::default()
        } else {
            scripts[count.min(scripts.len() - 1)].clone()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Scripted provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    fn count_tokens(&self, text: &str, _model: &str) -> Result<u32> {
        Ok((text.len() as f64 / 4.0).ceil() as u32)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        lock(&self.recorded_requests).push(request);
        let script = self.next_script();

        if let ScriptEnding::Reject(ref message) = script.ending {
            return Err(ApiError::ServerError {
                status: 500,
                message: message.clone(),
            }
            .into());
        }

        let stream = async_stream::stream! {
            for (delay, delta) in script.steps {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<_, SlaickError>(delta);
            }
            match script.ending {
                ScriptEnding::Hang => futures::future::pending::<()>().await,
                ScriptEnding::Fail(message) => {
                    yield Err(SlaickError::from(ApiError::StreamError(message)));
                }
                ScriptEnding::Complete | ScriptEnding::Reject(_) => {}
            }
        };

        Ok(Box::pin(stream))
    }
}
