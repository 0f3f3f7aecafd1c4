// src/llm/anthropic/mod.rs
// Anthropic Messages API client — backs the opus and sonnet tiers.

mod client;

pub use client::AnthropicClient;
