// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Redaction of personal data before text reaches the model

use regex::Regex;

use crate::config::RedactionConfig;
use crate::error::{Result, SlaickError};

/// Compiled redaction rules, applied in order
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    /// Build a redactor, or `None` when redaction is disabled.
    pub fn from_config(config: &RedactionConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        // Card numbers go before phones and SSNs, which match parts of them.
        let mut rules = vec![
            (compile("email", &config.email_pattern)?, "[EMAIL]"),
            (compile("credit card", &config.credit_card_pattern)?, "[CREDIT CARD]"),
            (compile("ssn", &config.ssn_pattern)?, "[SSN]"),
            (compile("phone", &config.phone_pattern)?, "[PHONE]"),
        ];
        if let Some(pattern) = config.user_defined_pattern.as_deref().filter(|p| !p.is_empty()) {
            rules.push((compile("user-defined", pattern)?, "[REDACTED]"));
        }
        Ok(Some(Self { rules }))
    }

    pub fn redact(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, (pattern, replacement)| {
                pattern.replace_all(&acc, *replacement).into_owned()
            })
    }
}

fn compile(label: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| SlaickError::Config(format!("invalid {} redaction pattern: {}", label, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> RedactionConfig {
        RedactionConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_yields_none() {
        assert!(Redactor::from_config(&RedactionConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_redacts_defaults() {
        let redactor = Redactor::from_config(&enabled()).unwrap().unwrap();
        let text = "mail jane.doe@example.com, call 555-123-4567, \
                    card 4111 1111 1111 1111, ssn 123-45-6789";
        assert_eq!(
            redactor.redact(text),
            "mail [EMAIL], call [PHONE], card [CREDIT CARD], ssn [SSN]"
        );
    }

    #[test]
    fn test_user_defined_pattern() {
        let mut config = enabled();
        config.user_defined_pattern = Some(r"PROJECT-\d+".to_string());
        let redactor = Redactor::from_config(&config).unwrap().unwrap();
        assert_eq!(redactor.redact("see PROJECT-42"), "see [REDACTED]");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let mut config = enabled();
        config.email_pattern = "(".to_string();
        let err = Redactor::from_config(&config).unwrap_err();
        assert!(matches!(err, SlaickError::Config(message) if message.contains("email")));
    }

    #[test]
    fn test_plain_text_untouched() {
        let redactor = Redactor::from_config(&enabled()).unwrap().unwrap();
        assert_eq!(redactor.redact("nothing to hide"), "nothing to hide");
    }
}
