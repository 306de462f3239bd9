// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory for creating completion providers

use std::sync::Arc;

use crate::config::{EnvLookup, Settings};
use crate::error::{Result, SlaickError};
use crate::llm::provider::CompletionProvider;
use crate::llm::providers::OpenAiProvider;

/// Factory for creating completion providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the configured provider, or `None` when no API key is set.
    pub fn create(settings: &Settings, env: &impl EnvLookup) -> Result<Option<Arc<dyn CompletionProvider>>> {
        let Some(api_key) = settings.api_key(env) else {
            return Ok(None);
        };

        match settings.provider.name.as_str() {
            "openai" => Ok(Some(Self::create_openai(settings, api_key))),
            other => Err(SlaickError::Config(format!(
                "Unknown provider '{}'. Supported providers: openai",
                other
            ))),
        }
    }

    /// Create an OpenAI-compatible provider
    pub fn create_openai(settings: &Settings, api_key: String) -> Arc<dyn CompletionProvider> {
        let provider = OpenAiProvider::with_base_url(api_key, &settings.provider.base_url)
            .with_organization(settings.provider.organization.clone())
            .with_context_window(settings.provider.context_window);
        Arc::new(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_no_api_key_yields_none() {
        let env: HashMap<String, String> = HashMap::new();
        assert!(ProviderFactory::create(&Settings::default(), &env)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_openai_from_env_key() {
        let env = HashMap::from([("OPENAI_API_KEY".to_string(), "sk-test".to_string())]);
        let provider = ProviderFactory::create(&Settings::default(), &env)
            .unwrap()
            .unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_unknown_provider() {
        let mut settings = Settings::default();
        settings.provider.name = "bedrock".to_string();
        let env = HashMap::from([("OPENAI_API_KEY".to_string(), "sk-test".to_string())]);
        assert!(matches!(
            ProviderFactory::create(&settings, &env),
            Err(SlaickError::Config(_))
        ));
    }
}
