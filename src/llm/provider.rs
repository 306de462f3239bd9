// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Completion provider trait and related types
//!
//! Defines the abstraction layer over the streaming completion service.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::message::Message;

/// Context window assumed for models missing from the provider's table
pub const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;

/// Tokens charged per message for role and framing
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Stream of deltas from a completion request
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// Main trait for completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// List known models
    fn available_models(&self) -> Vec<ModelInfo>;

    /// Get model info by ID
    fn get_model_info(&self, model: &str) -> Option<ModelInfo> {
        self.available_models().into_iter().find(|m| m.id == model)
    }

    /// Largest prompt the model accepts
    fn max_input_tokens(&self, model: &str) -> u32 {
        self.get_model_info(model)
            .map(|m| m.context_window)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    /// Whether image parts can be sent to the model
    fn supports_vision(&self, model: &str) -> bool {
        self.get_model_info(model)
            .map(|m| m.supports_vision)
            .unwrap_or(false)
    }

    /// Count tokens for a text (provider-specific tokenization)
    fn count_tokens(&self, text: &str, model: &str) -> Result<u32>;

    /// Count tokens for a whole message, charging `image_tokens` per image part
    fn count_message_tokens(&self, message: &Message, model: &str, image_tokens: u32) -> Result<u32> {
        let mut total = MESSAGE_OVERHEAD_TOKENS + self.count_tokens(&message.text(), model)?;
        if let Some(ref name) = message.name {
            total += self.count_tokens(name, model)?;
        }
        if let Some(ref call) = message.function_call {
            total += self.count_tokens(&call.name, model)?;
            total += self.count_tokens(&call.arguments, model)?;
        }
        total += message.image_count() as u32 * image_tokens;
        Ok(total)
    }

    /// Streaming completion
    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream>;
}

/// Request for a streaming completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Messages in the conversation, system prompt first
    pub messages: Vec<Message>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// End-user identifier forwarded to the provider
    pub user: Option<String>,

    /// Remaining time for this request
    pub timeout: Duration,

    /// Functions the model may call
    pub functions: Vec<FunctionDefinition>,
}

/// One increment of a streamed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Text fragment
    Content(String),

    /// Partial function call; `name` usually arrives once, `arguments` in pieces
    FunctionCall {
        name: Option<String>,
        arguments: Option<String>,
    },
}

/// Function definition offered to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object
    pub parameters: serde_json::Value,
}

/// Information about a model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model identifier
    pub id: String,

    /// Human-readable name
    pub display_name: String,

    /// Maximum context window in tokens
    pub context_window: u32,

    /// Maximum output tokens
    pub max_output_tokens: u32,

    /// Whether the model supports function calling
    pub supports_functions: bool,

    /// Whether the model supports vision
    pub supports_vision: bool,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 1.0,
            max_tokens: 1024,
            user: None,
            timeout: Duration::from_secs(30),
            functions: Vec::new(),
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the end-user identifier
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set callable functions
    pub fn with_functions(mut self, functions: Vec<FunctionDefinition>) -> Self {
        self.functions = functions;
        self
    }
}

impl StreamDelta {
    /// Text delta
    pub fn content(text: impl Into<String>) -> Self {
        StreamDelta::Content(text.into())
    }

    /// Function-call delta carrying both name and arguments
    pub fn function_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        StreamDelta::FunctionCall {
            name: Some(name.into()),
            arguments: Some(arguments.into()),
        }
    }
}
