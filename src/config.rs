use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::scanner::ScanMode;
use crate::store::{self, StoreError};

pub const OLLAMA_DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";
pub const LMSTUDIO_DEFAULT_ENDPOINT: &str = "http://127.0.0.1:1234/v1";

/// Which wire format the model server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` server (LM Studio, llama.cpp, vLLM...).
    LmStudio,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::LmStudio => "lmstudio",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Ollama => OLLAMA_DEFAULT_ENDPOINT,
            Provider::LmStudio => LMSTUDIO_DEFAULT_ENDPOINT,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "lmstudio" | "lm_studio" | "openai" => Ok(Provider::LmStudio),
            other => Err(ConfigError::InvalidValue {
                key: "provider",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings for one pipeline invocation. Missing keys in the stored file fall
/// back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    pub endpoint: String,
    pub model: String,
    pub language: String,
    pub automation_enabled: bool,
    pub command_scan: ScanMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            endpoint: OLLAMA_DEFAULT_ENDPOINT.to_string(),
            model: "gemma3:1b".to_string(),
            language: "vi".to_string(),
            automation_enabled: false,
            command_scan: ScanMode::Rescan,
        }
    }
}

impl Config {
    /// Base URL with any trailing slashes removed.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// Apply a single `key = value` change, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "provider" => {
                let provider: Provider = value.parse()?;
                // Follow the provider switch unless the user picked a custom endpoint.
                if self.base_url() == self.provider.default_endpoint() {
                    self.endpoint = provider.default_endpoint().to_string();
                }
                self.provider = provider;
            }
            "endpoint" => self.endpoint = value.trim().to_string(),
            "model" => self.model = value.trim().to_string(),
            "language" => self.language = value.trim().to_string(),
            "automation_enabled" | "automation" => {
                self.automation_enabled =
                    parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                        key: "automation_enabled",
                        value: value.to_string(),
                    })?;
            }
            "command_scan" => self.command_scan = value.parse()?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Overlay `PAGEMIND_*` environment variables. Bad values are logged and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        const VARS: [(&str, &str); 6] = [
            ("PAGEMIND_PROVIDER", "provider"),
            ("PAGEMIND_ENDPOINT", "endpoint"),
            ("PAGEMIND_MODEL", "model"),
            ("PAGEMIND_LANGUAGE", "language"),
            ("PAGEMIND_AUTOMATION", "automation_enabled"),
            ("PAGEMIND_COMMAND_SCAN", "command_scan"),
        ];
        for (var, key) in VARS {
            if let Ok(value) = std::env::var(var)
                && let Err(e) = self.set(key, &value)
            {
                tracing::warn!(var, error = %e, "ignoring environment override");
            }
        }
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Settings persisted as JSON. Plays the part of the extension's options storage.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/pagemind/settings.json`, or `./settings.json` when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("pagemind"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings merged over defaults. Never fails: an unreadable file
    /// is reported and defaults are used.
    pub fn load(&self) -> Config {
        match store::read_json::<Config>(&self.path) {
            Ok(Some(config)) => config,
            Ok(None) => Config::default(),
            Err(e) => {
                tracing::warn!(error = %e, "settings unreadable, using defaults");
                Config::default()
            }
        }
    }

    pub fn save(&self, config: &Config) -> Result<(), StoreError> {
        store::write_json(&self.path, config)
    }

    pub fn reset(&self) -> Result<(), StoreError> {
        store::remove(&self.path)
    }
}
