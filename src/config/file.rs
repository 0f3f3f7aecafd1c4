// src/config/file.rs
// File-based configuration from forge.toml (project root) or ~/.forge/config.toml

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Top-level config structure.
#[derive(Debug, Deserialize, Default)]
pub struct ForgeConfig {
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Tier -> model overrides. Targets per tier are configurable thresholds
/// only, not hardcoded model names.
#[derive(Debug, Deserialize, Default)]
pub struct TiersConfig {
    pub opus_model: Option<String>,
    pub sonnet_model: Option<String>,
    pub labor_model: Option<String>,
    /// Labor tier's OpenAI-compatible base URL, if not the Anthropic default.
    pub labor_base_url: Option<String>,
}

/// Engine-wide tunables.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Maximum automatic retries before the feedback router escalates.
    #[serde(default = "EngineConfig::default_max_auto_retries")]
    pub max_auto_retries: u32,
    /// Self-heal loop cap.
    #[serde(default = "EngineConfig::default_max_compilation_fix_attempts")]
    pub max_compilation_fix_attempts: u32,
    /// Context Budget Packer budget in tokens.
    #[serde(default = "EngineConfig::default_context_budget")]
    pub context_budget: u64,
    /// Non-stateful provider message budget.
    #[serde(default = "EngineConfig::default_message_budget")]
    pub message_budget: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_retries: Self::default_max_auto_retries(),
            max_compilation_fix_attempts: Self::default_max_compilation_fix_attempts(),
            context_budget: Self::default_context_budget(),
            message_budget: Self::default_message_budget(),
        }
    }
}

impl EngineConfig {
    fn default_max_auto_retries() -> u32 {
        3
    }
    fn default_max_compilation_fix_attempts() -> u32 {
        2
    }
    fn default_context_budget() -> u64 {
        40_000
    }
    fn default_message_budget() -> u64 {
        110_000
    }
}

impl ForgeConfig {
    /// Load config, preferring `./forge.toml`, falling back to
    /// `~/.forge/config.toml`, falling back to defaults.
    pub fn load() -> Self {
        let project_path = PathBuf::from("forge.toml");
        if project_path.exists() {
            return Self::load_from(&project_path);
        }
        Self::load_from(&Self::home_config_path())
    }

    fn load_from(path: &PathBuf) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    pub fn home_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| {
                warn!("HOME directory not set — using current directory for forge config.");
                PathBuf::from(".")
            })
            .join(".forge")
            .join("config.toml")
    }
}
