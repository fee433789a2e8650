use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::json_store::default_data_dir;

pub const SUPPORTED_LOCALES: &[&str] = &["en", "ru"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Where the store keeps its JSON files. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default = "default_matching_chunk_size")]
    pub matching_chunk_size: usize,
    #[serde(default = "default_matching_max_rounds")]
    pub matching_max_rounds: usize,
    #[serde(default = "default_writing_session_size")]
    pub writing_session_size: usize,
    #[serde(default = "default_max_lives")]
    pub max_lives: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_auto_advance_ms")]
    pub auto_advance_ms: u64,
}

fn default_locale() -> String {
    "en".to_string()
}
fn default_matching_chunk_size() -> usize {
    5
}
fn default_matching_max_rounds() -> usize {
    3
}
fn default_writing_session_size() -> usize {
    10
}
fn default_max_lives() -> u32 {
    3
}
fn default_cooldown_secs() -> u64 {
    600
}
fn default_auto_advance_ms() -> u64 {
    800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            data_dir: None,
            matching_chunk_size: default_matching_chunk_size(),
            matching_max_rounds: default_matching_max_rounds(),
            writing_session_size: default_writing_session_size(),
            max_lives: default_max_lives(),
            cooldown_secs: default_cooldown_secs(),
            auto_advance_ms: default_auto_advance_ms(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.validate();
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wordmaster")
            .join("config.toml")
    }

    pub fn data_path(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_dir(),
        }
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    /// Clamp values a hand-edited file may have pushed out of range.
    pub fn validate(&mut self) {
        if !SUPPORTED_LOCALES.contains(&self.locale.as_str()) {
            warn!(locale = %self.locale, "unsupported locale, using default");
            self.locale = default_locale();
        }
        self.matching_chunk_size = self.matching_chunk_size.clamp(2, 10);
        self.matching_max_rounds = self.matching_max_rounds.clamp(1, 20);
        self.writing_session_size = self.writing_session_size.clamp(1, 100);
        self.max_lives = self.max_lives.clamp(1, 10);
        // Cap at one day.
        self.cooldown_secs = self.cooldown_secs.min(86_400);
        self.auto_advance_ms = self.auto_advance_ms.min(10_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_defaults_from_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.locale, "en");
        assert_eq!(config.data_dir, None);
        assert_eq!(config.matching_chunk_size, 5);
        assert_eq!(config.writing_session_size, 10);
        assert_eq!(config.max_lives, 3);
        assert_eq!(config.cooldown_secs, 600);
    }

    #[test]
    fn test_config_serde_partial_file() {
        let toml_str = r#"
locale = "ru"
max_lives = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.locale, "ru");
        assert_eq!(config.max_lives, 5);
        assert_eq!(config.matching_max_rounds, 3);
        assert_eq!(config.auto_advance_ms, 800);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let mut config = Config::default();
        config.data_dir = Some("/tmp/wm".to_string());
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.data_dir, config.data_dir);
        assert_eq!(deserialized.cooldown_secs, config.cooldown_secs);
    }

    #[test]
    fn test_validate_clamps_out_of_range() {
        let mut config = Config {
            locale: "xx".to_string(),
            matching_chunk_size: 0,
            matching_max_rounds: 0,
            writing_session_size: 1000,
            max_lives: 0,
            cooldown_secs: 1_000_000,
            ..Config::default()
        };
        config.validate();
        assert_eq!(config.locale, "en");
        assert_eq!(config.matching_chunk_size, 2);
        assert_eq!(config.matching_max_rounds, 1);
        assert_eq!(config.writing_session_size, 100);
        assert_eq!(config.max_lives, 1);
        assert_eq!(config.cooldown_secs, 86_400);
    }

    #[test]
    fn test_data_path_prefers_explicit_dir() {
        let config = Config {
            data_dir: Some("/tmp/wm".to_string()),
            ..Config::default()
        };
        assert_eq!(config.data_path(), PathBuf::from("/tmp/wm"));
        assert!(Config::default().data_path().ends_with("wordmaster"));
    }
}
