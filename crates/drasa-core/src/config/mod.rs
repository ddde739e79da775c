use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration for drasa.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub slots: SlotsConfig,
    pub fallback: FallbackConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Effective credential for a slot: its own key if set, else the shared provider key.
    pub fn slot_api_key<'a>(&'a self, slot: &'a SlotConfig) -> Option<&'a str> {
        slot.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .or_else(|| Some(self.provider.api_key.as_str()).filter(|k| !k.is_empty()))
    }

    /// Directory holding the key/value store.
    pub fn data_dir(&self) -> PathBuf {
        match &self.storage.data_dir {
            Some(dir) if dir.starts_with("~/") || dir.starts_with("~\\") => {
                match dirs::home_dir() {
                    Some(home) => home.join(&dir[2..]),
                    None => PathBuf::from(dir),
                }
            }
            Some(dir) => PathBuf::from(dir),
            None => get_data_dir(),
        }
    }
}

/// Connection settings for the OpenRouter chat-completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub referer: String,
    pub title: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://openrouter.ai/api/v1".to_string(),
            referer: "https://drasa-ai.local".to_string(),
            title: "Drasa AI".to_string(),
            temperature: 0.7,
            max_tokens: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl SlotConfig {
    fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            api_key: None,
        }
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::with_model("google/gemini-2.0-flash-exp:free")
    }
}

/// The three upstream slots. `secondary` must name a vision-capable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotsConfig {
    pub primary: SlotConfig,
    pub secondary: SlotConfig,
    pub tertiary: SlotConfig,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            primary: SlotConfig::with_model("google/gemini-2.0-flash-exp:free"),
            secondary: SlotConfig::with_model("google/gemini-flash-1.5"),
            tertiary: SlotConfig::with_model("mistralai/mistral-7b-instruct:free"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FallbackConfig {
    /// How long a rate-limited slot is skipped.
    pub cooldown_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { cooldown_secs: 120 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `DRASA_CONFIG` env var: full JSON config
/// 2. Individual env vars merged on top of the file config (`~/.drasa/config.json`)
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("DRASA_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse DRASA_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg);
    cfg
}

/// Overlay the individual `OPENROUTER_API_KEY` / `DRASA_*` variables.
fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("OPENROUTER_API_KEY") {
        cfg.provider.api_key = v;
    }
    if let Ok(v) = std::env::var("DRASA_API_BASE") {
        cfg.provider.api_base = v;
    }
    if let Ok(v) = std::env::var("DRASA_PRIMARY_MODEL") {
        cfg.slots.primary.model = v;
    }
    if let Ok(v) = std::env::var("DRASA_SECONDARY_MODEL") {
        cfg.slots.secondary.model = v;
    }
    if let Ok(v) = std::env::var("DRASA_TERTIARY_MODEL") {
        cfg.slots.tertiary.model = v;
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drasa")
        .join("config.json")
}

/// Get the drasa data directory.
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drasa")
}

/// Load configuration from file or fall back to defaults.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
