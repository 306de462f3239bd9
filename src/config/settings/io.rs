// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::Result;

use super::Settings;

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::slaick_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a specific path, fully overwriting.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the slaick home directory (~/.slaick or $SLAICK_HOME).
    pub fn slaick_home() -> PathBuf {
        if let Ok(home) = std::env::var("SLAICK_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".slaick")
    }

    /// Serialize for display with every secret masked.
    pub fn to_redacted_json(&self) -> Result<String> {
        let mut copy = self.clone();
        if copy.provider.api_key.is_some() {
            copy.provider.api_key = Some("********".to_string());
        }
        if copy.slack.bot_token.is_some() {
            copy.slack.bot_token = Some("********".to_string());
        }
        Ok(serde_json::to_string_pretty(&copy)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join("missing.json")).unwrap();
        assert_eq!(settings.provider.model, "gpt-4o");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.provider.model = "gpt-4o-mini".to_string();
        settings.streaming.flush_every_deltas = 5;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.provider.model, "gpt-4o-mini");
        assert_eq!(loaded.streaming.flush_every_deltas, 5);
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_redacted_json_masks_secrets() {
        let mut settings = Settings::default();
        settings.provider.api_key = Some("sk-secret".to_string());
        settings.slack.bot_token = Some("xoxb-secret".to_string());

        let json = settings.to_redacted_json().unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("xoxb-secret"));
        assert!(json.contains("********"));
    }
}
