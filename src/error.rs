// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Slaick
//!
//! This module defines all error types used throughout the application.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Slaick operations
#[derive(Error, Debug)]
pub enum SlaickError {
    /// Completion provider errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Messaging surface errors
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// The conversation cannot be trimmed below the model's budget
    #[error("Conversation too long: {used} tokens exceeds budget of {available}")]
    BudgetOverflow { used: u32, available: u32 },

    /// The turn ran past its wall-clock limit
    #[error("Stream timed out after {elapsed:?}")]
    StreamTimeout { elapsed: Duration },

    /// Function-call arguments were not a JSON object
    #[error("Invalid arguments for function '{function}': {message}")]
    ArgumentParse { function: String, message: String },

    /// The model asked for a function that is not registered
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A registered function failed
    #[error("Function execution failed: {0}")]
    FunctionExecution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Completion API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Context window exceeded on the provider side
    #[error("Context too long: {current} tokens exceeds limit of {limit}")]
    ContextTooLong { current: u32, limit: u32 },

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Messaging surface error types
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// The surface refused the text because of its size
    #[error("Message too long")]
    MessageTooLong,

    /// The referenced message does not exist
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Any other error reported by the surface API
    #[error("Surface API error: {0}")]
    Api(String),
}

/// Result type alias for Slaick operations
pub type Result<T> = std::result::Result<T, SlaickError>;

/// Notice appended to the reply when the turn runs out of time.
pub const TIMEOUT_NOTICE: &str =
    ":warning: Apologies! It seems that the model didn't respond within the time limit. \
     Please try again later.";

impl SlaickError {
    /// Text shown to the user in place of (or after) the partial reply.
    pub fn user_notice(&self) -> String {
        match self {
            SlaickError::BudgetOverflow { used, available } => format!(
                ":warning: The previous message is too long ({}/{} prompt tokens).",
                used, available
            ),
            SlaickError::StreamTimeout { .. } => TIMEOUT_NOTICE.to_string(),
            other => format!(
                ":warning: Failed to start a conversation with the model: {}",
                other
            ),
        }
    }

    /// Whether this failure replaces the in-progress text instead of being appended to it.
    pub fn replaces_reply(&self) -> bool {
        matches!(self, SlaickError::BudgetOverflow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_overflow_display() {
        let err = SlaickError::BudgetOverflow {
            used: 1200,
            available: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Conversation too long: 1200 tokens exceeds budget of 1000"
        );
    }

    #[test]
    fn test_budget_overflow_notice() {
        let err = SlaickError::BudgetOverflow {
            used: 1200,
            available: 1000,
        };
        assert_eq!(
            err.user_notice(),
            ":warning: The previous message is too long (1200/1000 prompt tokens)."
        );
        assert!(err.replaces_reply());
    }

    #[test]
    fn test_timeout_notice() {
        let err = SlaickError::StreamTimeout {
            elapsed: Duration::from_secs(6),
        };
        assert_eq!(err.user_notice(), TIMEOUT_NOTICE);
        assert!(!err.replaces_reply());
    }

    #[test]
    fn test_generic_notice_includes_cause() {
        let err = SlaickError::UnknownFunction("get_weather".to_string());
        let notice = err.user_notice();
        assert!(notice.starts_with(":warning: Failed to start a conversation"));
        assert!(notice.contains("get_weather"));
    }

    #[test]
    fn test_surface_error_conversion() {
        let err: SlaickError = SurfaceError::MessageTooLong.into();
        assert!(matches!(
            err,
            SlaickError::Surface(SurfaceError::MessageTooLong)
        ));
    }

    #[test]
    fn test_api_error_conversion() {
        let err: SlaickError = ApiError::RateLimited(30).into();
        assert_eq!(
            err.to_string(),
            "API error: Rate limited: retry after 30 seconds"
        );
    }

    #[test]
    fn test_argument_parse_display() {
        let err = SlaickError::ArgumentParse {
            function: "lookup".to_string(),
            message: "expected value at line 1 column 1".to_string(),
        };
        assert!(err.to_string().contains("lookup"));
    }
}
