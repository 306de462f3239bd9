// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Slaick
//!
//! Handles loading settings from ~/.slaick/settings.json and layering the
//! environment variables the bot has always honoured on top.

use serde::{Deserialize, Serialize};

mod env;
mod io;
mod validation;

pub use env::{EnvLookup, ProcessEnv};

/// Main settings structure, stored in ~/.slaick/settings.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Slack Web API configuration
    #[serde(default)]
    pub slack: SlackConfig,

    /// Conversation and token budget settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Incremental rendering settings
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// How much Slack history is gathered as context
    #[serde(default)]
    pub history: HistoryConfig,

    /// Function calling settings
    #[serde(default)]
    pub functions: FunctionsConfig,

    /// Sensitive data redaction for text sent to the model
    #[serde(default)]
    pub redaction: RedactionConfig,

    /// Slack file attachments
    #[serde(default)]
    pub files: FilesConfig,

    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// OpenAI-compatible completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (only "openai" is built in)
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL for the API
    #[serde(default = "default_api_base")]
    pub base_url: String,

    /// Organization header sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Context window override for models missing from the built-in table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

/// Slack Web API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Environment variable name for the bot token
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Base URL for the Web API
    #[serde(default = "default_slack_base_url")]
    pub base_url: String,

    /// Bot user ID (U...), used for mention detection and the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,

    /// Bot ID (B...), used to tell our own messages from other bots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

/// Conversation and token budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// System prompt template; `{bot_user_id}` is substituted
    #[serde(default = "default_system_text")]
    pub system_text: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tokens reserved for the model's reply
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Wall-clock limit for a whole turn, including function calls
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Translate between Markdown and Slack mrkdwn
    #[serde(default)]
    pub translate_markdown: bool,

    /// Tokens reserved for function definitions when any are offered
    #[serde(default = "default_function_token_reserve")]
    pub function_token_reserve: u32,

    /// Estimated tokens per image part
    #[serde(default = "default_image_token_estimate")]
    pub image_token_estimate: u32,
}

/// Incremental rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Content deltas between background flushes
    #[serde(default = "default_flush_every_deltas")]
    pub flush_every_deltas: usize,

    /// Background flushes allowed in flight at once
    #[serde(default = "default_flush_concurrency")]
    pub flush_concurrency: usize,

    /// Largest chunk sent after the surface rejects a message as too long
    #[serde(default = "default_max_chunk_length")]
    pub max_chunk_length: usize,

    /// Suffix shown while the reply is still being written
    #[serde(default = "default_loading_suffix")]
    pub loading_suffix: String,

    /// Text of the placeholder posted before the model starts
    #[serde(default = "default_loading_text")]
    pub loading_text: String,
}

/// How much Slack history is gathered as context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Messages fetched from a DM channel
    #[serde(default = "default_dm_history_limit")]
    pub dm_history_limit: usize,

    /// Oldest DM message (in seconds) still used as context
    #[serde(default = "default_dm_max_age_secs")]
    pub dm_max_age_secs: u64,

    /// Replies fetched from a thread
    #[serde(default = "default_thread_reply_limit")]
    pub thread_reply_limit: usize,
}

/// Function calling settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FunctionsConfig {
    /// Register the built-in functions at startup
    #[serde(default)]
    pub enable_builtin: bool,
}

/// Patterns replaced before any Slack text reaches the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_email_pattern")]
    pub email_pattern: String,

    #[serde(default = "default_phone_pattern")]
    pub phone_pattern: String,

    #[serde(default = "default_credit_card_pattern")]
    pub credit_card_pattern: String,

    #[serde(default = "default_ssn_pattern")]
    pub ssn_pattern: String,

    /// Extra pattern supplied by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_defined_pattern: Option<String>,
}

/// Slack file attachments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Download attachments and pass them to the model
    #[serde(default)]
    pub enabled: bool,

    /// Larger files are replaced by a note
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            slack: SlackConfig::default(),
            conversation: ConversationConfig::default(),
            streaming: StreamingConfig::default(),
            history: HistoryConfig::default(),
            functions: FunctionsConfig::default(),
            redaction: RedactionConfig::default(),
            files: FilesConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email_pattern: default_email_pattern(),
            phone_pattern: default_phone_pattern(),
            credit_card_pattern: default_credit_card_pattern(),
            ssn_pattern: default_ssn_pattern(),
            user_defined_pattern: None,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_api_base(),
            organization: None,
            context_window: None,
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_token_env: default_bot_token_env(),
            base_url: default_slack_base_url(),
            bot_user_id: None,
            bot_id: None,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_text: default_system_text(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            timeout_seconds: default_timeout_seconds(),
            translate_markdown: false,
            function_token_reserve: default_function_token_reserve(),
            image_token_estimate: default_image_token_estimate(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            flush_every_deltas: default_flush_every_deltas(),
            flush_concurrency: default_flush_concurrency(),
            max_chunk_length: default_max_chunk_length(),
            loading_suffix: default_loading_suffix(),
            loading_text: default_loading_text(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dm_history_limit: default_dm_history_limit(),
            dm_max_age_secs: default_dm_max_age_secs(),
            thread_reply_limit: default_thread_reply_limit(),
        }
    }
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_bot_token_env() -> String {
    "SLACK_BOT_TOKEN".to_string()
}

fn default_slack_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_system_text() -> String {
    "You are a bot in a slack chat room. You might receive messages from multiple people.\n\
     Format bold text *like this*, italic text _like this_ and strikethrough text ~like this~.\n\
     Slack user IDs match the regex `<@U.*?>`.\n\
     Your Slack user ID is <@{bot_user_id}>.\n\
     Each message has the author's Slack user ID prepended, like the regex `^<@U.*?>: ` \
     followed by the message text.\n"
        .to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_response_tokens() -> u32 {
    1024
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_function_token_reserve() -> u32 {
    100
}

fn default_image_token_estimate() -> u32 {
    1000
}

fn default_flush_every_deltas() -> usize {
    20
}

fn default_flush_concurrency() -> usize {
    2
}

fn default_max_chunk_length() -> usize {
    3000
}

fn default_loading_suffix() -> String {
    " ... :writing_hand:".to_string()
}

fn default_loading_text() -> String {
    ":hourglass_flowing_sand: Wait a second, please ...".to_string()
}

fn default_dm_history_limit() -> usize {
    100
}

fn default_dm_max_age_secs() -> u64 {
    86_400
}

fn default_thread_reply_limit() -> usize {
    1000
}

fn default_email_pattern() -> String {
    r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string()
}

fn default_phone_pattern() -> String {
    r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b".to_string()
}

fn default_credit_card_pattern() -> String {
    r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b".to_string()
}

fn default_ssn_pattern() -> String {
    r"\b\d{3}[- ]?\d{2}[- ]?\d{4}\b".to_string()
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024
}
