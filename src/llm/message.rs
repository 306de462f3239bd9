// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! A conversation window is an ordered `Vec<Message>`; the first entry is the
//! system prompt and the rest are user, assistant and function turns in
//! chronological order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Ordered content parts
    pub content: Vec<ContentPart>,

    /// Function name when `role` is `Function`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Function call requested by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Result of a function the assistant asked for
    Function,
}

/// A part of a message's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content
    Text { text: String },
    /// Raw image bytes with their MIME type
    Image { data: Vec<u8>, mime_type: String },
}

/// A function call buffered from the stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON arguments as streamed by the model
    pub arguments: String,
}

impl Message {
    fn with_role(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            name: None,
            function_call: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, vec![ContentPart::text(text)])
    }

    /// Create a new user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, vec![ContentPart::text(text)])
    }

    /// Create a new user message from several parts
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_role(Role::User, parts)
    }

    /// Create a new assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// Assistant message recording a function call it made
    pub fn assistant_function_call(call: FunctionCall) -> Self {
        let mut message = Self::with_role(Role::Assistant, Vec::new());
        message.function_call = Some(call);
        message
    }

    /// Create a function result message
    pub fn function_result(name: impl Into<String>, result: impl Into<String>) -> Self {
        let mut message = Self::with_role(Role::Function, vec![ContentPart::text(result)]);
        message.name = Some(name.into());
        message
    }

    /// All text parts joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of image parts
    pub fn image_count(&self) -> usize {
        self.content
            .iter()
            .filter(|part| matches!(part, ContentPart::Image { .. }))
            .count()
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

impl ContentPart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Create an image part
    pub fn image(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        ContentPart::Image {
            data,
            mime_type: mime_type.into(),
        }
    }
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        };
        f.write_str(s)
    }
}
