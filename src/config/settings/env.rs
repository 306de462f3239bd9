// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashMap;

use crate::error::{Result, SlaickError};

use super::Settings;

/// Source of environment variables.
///
/// The process environment is the normal source; tests pass a map.
pub trait EnvLookup {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from `std::env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl Settings {
    /// Load from the default path and apply the process environment.
    pub fn load_with_env() -> Result<Self> {
        let mut settings = Self::load()?;
        settings.apply_env(&ProcessEnv)?;
        Ok(settings)
    }

    /// Overlay environment variables on top of the file values.
    ///
    /// Priority: env var > config file > default.
    pub fn apply_env(&mut self, env: &impl EnvLookup) -> Result<()> {
        if let Some(model) = env.get("OPENAI_MODEL") {
            self.provider.model = model;
        }
        if let Some(base) = env.get("OPENAI_API_BASE") {
            self.provider.base_url = base;
        }
        if let Some(org) = env.get("OPENAI_ORG_ID") {
            self.provider.organization = Some(org);
        }
        if let Some(value) = env.get("TEMPERATURE") {
            self.conversation.temperature = parse_var("TEMPERATURE", &value)?;
        }
        if let Some(value) = env.get("MAX_RESPONSE_TOKENS") {
            self.conversation.max_response_tokens = parse_var("MAX_RESPONSE_TOKENS", &value)?;
        }
        if let Some(value) = env.get("TIMEOUT_SECONDS") {
            self.conversation.timeout_seconds = parse_var("TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = env.get("TRANSLATE_MARKDOWN") {
            self.conversation.translate_markdown = parse_flag(&value);
        }
        if let Some(text) = env.get("SYSTEM_TEXT") {
            self.conversation.system_text = text;
        }
        if let Some(value) = env.get("REDACTION_ENABLED") {
            self.redaction.enabled = parse_flag(&value);
        }
        if let Some(pattern) = env.get("REDACT_EMAIL_PATTERN") {
            self.redaction.email_pattern = pattern;
        }
        if let Some(pattern) = env.get("REDACT_PHONE_PATTERN") {
            self.redaction.phone_pattern = pattern;
        }
        if let Some(pattern) = env.get("REDACT_CREDIT_CARD_PATTERN") {
            self.redaction.credit_card_pattern = pattern;
        }
        if let Some(pattern) = env.get("REDACT_SSN_PATTERN") {
            self.redaction.ssn_pattern = pattern;
        }
        if let Some(pattern) = env.get("REDACT_USER_DEFINED_PATTERN") {
            self.redaction.user_defined_pattern = Some(pattern);
        }
        if let Some(value) = env.get("IMAGE_FILE_ACCESS_ENABLED") {
            self.files.enabled = parse_flag(&value);
        }
        if let Some(level) = env.get("SLACK_APP_LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        Ok(())
    }

    /// Get the completion API key, checking the env var first.
    pub fn api_key(&self, env: &impl EnvLookup) -> Option<String> {
        env.get(&self.provider.api_key_env)
            .or_else(|| self.provider.api_key.clone())
    }

    /// Get the Slack bot token, checking the env var first.
    pub fn bot_token(&self, env: &impl EnvLookup) -> Option<String> {
        env.get(&self.slack.bot_token_env)
            .or_else(|| self.slack.bot_token.clone())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SlaickError::Config(format!("{} has an invalid value: {}", key, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
