// src/llm/provider.rs
// LLM provider abstraction layer

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ChatResult, Message, Tool, ToolChoice};

/// Wire-level LLM provider. Distinct from `crate::llm::tier::Tier` — a
/// tier (opus/sonnet/labor) picks a provider + model; the provider is just
/// which API shape we speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API — backs the opus and sonnet tiers.
    Anthropic,
    /// Haiku-class labor tier. Spec §4.2 explicitly allows this to resolve
    /// to a non-Anthropic, OpenAI-compatible endpoint.
    Labor,
}

impl Provider {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "labor" => Some(Self::Labor),
            _ => None,
        }
    }

    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Labor => "FORGE_LABOR_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Labor => write!(f, "labor"),
        }
    }
}

/// Normalized usage statistics across all providers
#[derive(Debug, Clone, Default)]
pub struct NormalizedUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl NormalizedUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

/// Trait for LLM clients - every tier's backing client implements this.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a chat completion request with the model free to choose whether
    /// and which tool to call.
    async fn chat(&self, messages: Vec<Message>, tools: Option<Vec<Tool>>) -> Result<ChatResult>;

    /// Send a chat completion request constrained by `choice`. The Worker
    /// Runtime uses `ToolChoice::Tool("submit_result")` to force
    /// termination through a single structured call.
    ///
    /// Default implementation ignores the constraint and falls back to an
    /// auto-choice `chat()` call — providers that can express a forced
    /// choice on the wire should override this.
    async fn chat_with_choice(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        _choice: ToolChoice,
    ) -> Result<ChatResult> {
        self.chat(messages, tools).await
    }

    /// Token budget for this provider's context window (0 = no budget management).
    fn context_budget(&self) -> u64 {
        0
    }

    fn supports_context_budget(&self) -> bool {
        self.context_budget() > 0
    }

    fn provider_type(&self) -> Provider;

    fn model_name(&self) -> String;

    fn normalize_usage(&self, result: &ChatResult) -> NormalizedUsage {
        result
            .usage
            .as_ref()
            .map(|u| NormalizedUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default()
    }
}
