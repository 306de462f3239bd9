// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation turn orchestration.
//!
//! One turn trims the window, streams a completion onto the renderer and,
//! when the model asks for a function call, runs it and streams again. All
//! requests of a turn share one deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::chat::render::IncrementalRenderer;
use crate::chat::streaming::{StreamConsumer, StreamOutcome};
use crate::chat::trim::{trim, TokenBudget};
use crate::config::Settings;
use crate::error::{Result, SlaickError};
use crate::functions::FunctionTable;
use crate::llm::{CompletionProvider, CompletionRequest, DeltaStream, Message};

/// Per-turn model and streaming parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TurnConfig {
    pub model: String,
    pub temperature: f32,
    pub max_response_tokens: u32,
    /// Wall-clock limit for the whole turn, function calls included
    pub timeout: Duration,
    /// Prompt tokens held back when functions are offered
    pub function_token_reserve: u32,
    /// Tokens charged per attached image
    pub image_token_estimate: u32,
    /// Content deltas between background flushes
    pub flush_every: usize,
    pub flush_concurrency: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl TurnConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.provider.model.clone(),
            temperature: settings.conversation.temperature,
            max_response_tokens: settings.conversation.max_response_tokens,
            timeout: settings.turn_timeout(),
            function_token_reserve: settings.conversation.function_token_reserve,
            image_token_estimate: settings.conversation.image_token_estimate,
            flush_every: settings.streaming.flush_every_deltas,
            flush_concurrency: settings.streaming.flush_concurrency,
        }
    }
}

/// How a turn ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The final reply is on the surface
    Completed { text: String, function_calls: usize },
    /// A newer message arrived and the reply was removed
    Superseded,
}

/// Runs conversation turns against one provider
pub struct ConversationOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    functions: Arc<FunctionTable>,
    config: TurnConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        functions: Arc<FunctionTable>,
        config: TurnConfig,
    ) -> Self {
        Self {
            provider,
            functions,
            config,
        }
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn CompletionProvider> {
        &self.provider
    }

    /// Run a turn and, on failure, show the error's notice on the reply.
    pub async fn respond(
        &self,
        messages: Vec<Message>,
        user: Option<String>,
        renderer: &IncrementalRenderer,
    ) -> Result<TurnOutcome> {
        let result = self.run_turn(messages, user, renderer).await;

        match &result {
            Ok(TurnOutcome::Completed { function_calls, .. }) => tracing::info!(
                target: "slaick.chat.engine",
                function_calls,
                "turn complete"
            ),
            Ok(TurnOutcome::Superseded) => tracing::info!(
                target: "slaick.chat.engine",
                "turn superseded by a newer message"
            ),
            Err(error) => {
                tracing::warn!(target: "slaick.chat.engine", error = %error, "turn failed");
                let notice = error.user_notice();
                let shown = if error.replaces_reply() {
                    renderer.replace_with_notice(&notice).await
                } else {
                    renderer.append_notice(&notice).await
                };
                if let Err(render_error) = shown {
                    tracing::warn!(
                        target: "slaick.chat.engine",
                        error = %render_error,
                        "failed to show error notice"
                    );
                }
            }
        }

        result
    }

    /// Run a turn without rendering error notices.
    pub async fn run_turn(
        &self,
        mut messages: Vec<Message>,
        user: Option<String>,
        renderer: &IncrementalRenderer,
    ) -> Result<TurnOutcome> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let model = self.config.model.as_str();
        let definitions = self.functions.definitions();
        let budget = TokenBudget::for_turn(
            self.provider.max_input_tokens(model),
            self.config.max_response_tokens,
            self.config.function_token_reserve,
            !definitions.is_empty(),
        );
        let consumer = StreamConsumer::new(
            renderer.clone(),
            self.config.flush_every,
            self.config.flush_concurrency,
        );
        let timed_out = || SlaickError::StreamTimeout {
            elapsed: started.elapsed(),
        };

        tracing::info!(
            target: "slaick.chat.engine",
            model = %model,
            messages = messages.len(),
            functions = definitions.len(),
            "turn start"
        );

        let mut function_calls = 0usize;
        loop {
            let report = trim(
                &mut messages,
                |message| {
                    self.provider
                        .count_message_tokens(message, model, self.config.image_token_estimate)
                },
                &budget,
            )?;
            if !report.fits() {
                return Err(SlaickError::BudgetOverflow {
                    used: report.used_tokens,
                    available: report.available_tokens,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            let request = CompletionRequest::new(model, messages.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_response_tokens)
                .with_user(user.clone())
                .with_timeout(remaining)
                .with_functions(definitions.clone());

            tracing::debug!(
                target: "slaick.chat.engine",
                round = function_calls,
                messages = messages.len(),
                prompt_tokens = report.used_tokens,
                remaining_ms = remaining.as_millis() as u64,
                "opening completion stream"
            );
            let stream: DeltaStream =
                tokio::time::timeout_at(deadline, self.provider.complete_stream(request))
                    .await
                    .map_err(|_| timed_out())??;

            if function_calls == 0 && !renderer.is_latest().await? {
                renderer.discard().await?;
                return Ok(TurnOutcome::Superseded);
            }

            match consumer.consume(stream, deadline, started).await? {
                StreamOutcome::Completed(text) => {
                    return Ok(TurnOutcome::Completed {
                        text,
                        function_calls,
                    })
                }
                StreamOutcome::Superseded => return Ok(TurnOutcome::Superseded),
                StreamOutcome::FunctionCall(call) => {
                    function_calls += 1;
                    let result = tokio::time::timeout_at(deadline, self.functions.execute(&call))
                        .await
                        .map_err(|_| timed_out())??;
                    tracing::debug!(
                        target: "slaick.chat.engine",
                        function = %call.name,
                        result_chars = result.chars().count(),
                        "function result ready, continuing"
                    );
                    let name = call.name.clone();
                    messages.push(Message::assistant_function_call(call));
                    messages.push(Message::function_result(name, result));
                }
            }
        }
    }
}
