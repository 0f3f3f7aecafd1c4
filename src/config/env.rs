// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, info, warn};

/// API keys loaded from environment variables.
///
/// `ANTHROPIC_API_KEY` backs the opus (judgment) and sonnet (supervision)
/// tiers. The haiku-class labor tier is explicitly allowed to resolve to a
/// non-Anthropic, OpenAI-compatible provider — that key is read
/// separately as `labor`.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Anthropic API key (ANTHROPIC_API_KEY) - opus + sonnet tiers.
    pub anthropic: Option<String>,
    /// Labor-tier API key (FORGE_LABOR_API_KEY) - an OpenAI-compatible
    /// endpoint, independent of Anthropic.
    pub labor: Option<String>,
    /// Brave Search API key (BRAVE_API_KEY), used by the WebResearch worker.
    pub brave: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables (single source of truth).
    ///
    /// Set `FORGE_DISABLE_LLM=1` to suppress all LLM keys (forces
    /// heuristic/no-op fallbacks for every LLM-backed component).
    pub fn from_env() -> Self {
        if parse_bool_env("FORGE_DISABLE_LLM").unwrap_or(false) {
            info!("FORGE_DISABLE_LLM is set — LLM providers disabled, using fallbacks");
            return Self {
                anthropic: None,
                labor: None,
                brave: Self::read_key("BRAVE_API_KEY"),
            };
        }

        let anthropic = Self::read_key("ANTHROPIC_API_KEY");
        let labor = Self::read_key("FORGE_LABOR_API_KEY");
        let brave = Self::read_key("BRAVE_API_KEY");

        let keys = Self {
            anthropic,
            labor,
            brave,
        };
        keys.log_status();
        keys
    }

    /// Read a single API key from environment, filtering empty values.
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Check if web search is available (requires Brave key).
    pub fn has_web_search(&self) -> bool {
        self.brave.is_some()
    }

    /// Log which API keys are available (without exposing values).
    fn log_status(&self) {
        let mut available = Vec::new();
        if self.anthropic.is_some() {
            available.push("Anthropic");
        }
        if self.labor.is_some() {
            available.push("Labor");
        }
        if self.brave.is_some() {
            available.push("Brave Search");
        }

        if available.is_empty() {
            warn!("No API keys configured - LLM-backed workers will use fallbacks");
        } else {
            debug!(keys = ?available, "API keys loaded");
        }
    }

    /// Judgment and supervision tiers (opus, sonnet) require Anthropic.
    pub fn has_judgment_tier(&self) -> bool {
        self.anthropic.is_some()
    }

    /// The labor tier can fall back to the judgment provider if unset.
    pub fn has_labor_tier(&self) -> bool {
        self.labor.is_some() || self.anthropic.is_some()
    }

    /// Summary of available providers, for diagnostics.
    pub fn summary(&self) -> String {
        let mut providers = Vec::new();
        if self.anthropic.is_some() {
            providers.push("Anthropic");
        }
        if self.labor.is_some() {
            providers.push("Labor");
        }
        if self.brave.is_some() {
            providers.push("Brave Search");
        }
        if providers.is_empty() {
            "None".to_string()
        } else {
            providers.join(", ")
        }
    }
}

/// Configuration validation result.
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report.
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Known labor-tier provider profiles, resolved to their chat-completions
/// endpoint when `FORGE_LABOR_BASE_URL` is not set explicitly.
fn known_labor_base_url(provider: &str) -> Option<&'static str> {
    match provider.to_lowercase().as_str() {
        "deepseek" => Some("https://api.deepseek.com/chat/completions"),
        _ => None,
    }
}

/// All process-environment configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    /// FORGE_DEBUG=1 enables full-prompt logging.
    pub debug_prompts: bool,
    /// FORGE_MAX_AUTO_RETRIES override (falls back to ForgeConfig / default 3).
    pub max_auto_retries_override: Option<u32>,
    /// FORGE_LABOR_PROVIDER — names an OpenAI-compatible vendor profile
    /// (e.g. "deepseek") for the haiku-class labor tier.
    pub labor_provider: Option<String>,
    /// FORGE_LABOR_BASE_URL — explicit override, takes precedence over
    /// `labor_provider`'s known profile.
    pub labor_base_url: Option<String>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup).
    pub fn load() -> Self {
        info!("Loading environment configuration");

        Self {
            api_keys: ApiKeys::from_env(),
            debug_prompts: parse_bool_env("FORGE_DEBUG").unwrap_or(false),
            max_auto_retries_override: std::env::var("FORGE_MAX_AUTO_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok()),
            labor_provider: std::env::var("FORGE_LABOR_PROVIDER").ok(),
            labor_base_url: std::env::var("FORGE_LABOR_BASE_URL").ok(),
        }
    }

    /// Resolve the labor tier's base URL: explicit override, else the known
    /// profile for `labor_provider`, else `None` (caller must supply one via
    /// `[tiers].labor_base_url` in `ForgeConfig`).
    pub fn resolve_labor_base_url(&self) -> Option<String> {
        self.labor_base_url.clone().or_else(|| {
            self.labor_provider
                .as_deref()
                .and_then(known_labor_base_url)
                .map(String::from)
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if !self.api_keys.has_judgment_tier() {
            validation.add_warning(
                "No ANTHROPIC_API_KEY configured. Opus/sonnet-tier operations will fail.",
            );
        }

        validation
    }
}

fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
