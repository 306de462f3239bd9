// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use crate::chat::formatting::slack_to_markdown;
use crate::chat::redaction::Redactor;
use crate::error::{Result, SlaickError};

use super::Settings;

impl Settings {
    /// Reject values the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        let temperature = self.conversation.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(SlaickError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                temperature
            )));
        }
        if self.conversation.timeout_seconds == 0 {
            return Err(SlaickError::Config(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.conversation.max_response_tokens == 0 {
            return Err(SlaickError::Config(
                "max_response_tokens must be greater than zero".to_string(),
            ));
        }
        if self.streaming.max_chunk_length == 0 {
            return Err(SlaickError::Config(
                "max_chunk_length must be greater than zero".to_string(),
            ));
        }
        if self.streaming.flush_every_deltas == 0 {
            return Err(SlaickError::Config(
                "flush_every_deltas must be greater than zero".to_string(),
            ));
        }
        if self.streaming.flush_concurrency == 0 {
            return Err(SlaickError::Config(
                "flush_concurrency must be greater than zero".to_string(),
            ));
        }
        Redactor::from_config(&self.redaction)?;
        Ok(())
    }

    /// Wall-clock limit for one turn.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.conversation.timeout_seconds)
    }

    /// System prompt with the bot's user ID filled in.
    ///
    /// With markdown translation on, the prompt's own formatting hints are
    /// rewritten to Markdown so the model answers in Markdown.
    pub fn system_prompt(&self, bot_user_id: &str) -> String {
        let prompt = self
            .conversation
            .system_text
            .replace("{bot_user_id}", bot_user_id);
        if self.conversation.translate_markdown {
            slack_to_markdown(&prompt)
        } else {
            prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_temperature_out_of_range() {
        let mut settings = Settings::default();
        settings.conversation.temperature = 2.5;
        assert!(settings.validate().is_err());
        settings.conversation.temperature = -0.1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut settings = Settings::default();
        settings.conversation.timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_chunk_length_rejected() {
        let mut settings = Settings::default();
        settings.streaming.max_chunk_length = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_flush_concurrency_rejected() {
        let mut settings = Settings::default();
        settings.streaming.flush_concurrency = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_bad_redaction_pattern_rejected_only_when_enabled() {
        let mut settings = Settings::default();
        settings.redaction.ssn_pattern = "[".to_string();
        assert!(settings.validate().is_ok());
        settings.redaction.enabled = true;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_system_prompt_substitution() {
        let settings = Settings::default();
        let prompt = settings.system_prompt("U123");
        assert!(prompt.contains("<@U123>"));
        assert!(!prompt.contains("{bot_user_id}"));
    }

    #[test]
    fn test_system_prompt_markdown_hint() {
        let mut settings = Settings::default();
        settings.conversation.translate_markdown = true;
        let prompt = settings.system_prompt("U123");
        assert!(prompt.contains("**like this**"));
        assert!(prompt.contains("~~like this~~"));
    }

    #[test]
    fn test_turn_timeout() {
        let settings = Settings::default();
        assert_eq!(settings.turn_timeout(), Duration::from_secs(30));
    }
}
