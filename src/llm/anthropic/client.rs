// src/llm/anthropic/client.rs
// Anthropic Messages API client (non-streaming).

use crate::llm::http_client::LlmHttpClient;
use crate::llm::provider::{LlmClient, Provider};
use crate::llm::{ChatResult, FunctionCall, Message, Tool, ToolCall, ToolChoice, Usage};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    http: LlmHttpClient,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let http = LlmHttpClient::new(Duration::from_secs(300), Duration::from_secs(30));
        Self {
            api_key,
            model,
            base_url,
            http,
        }
    }

    /// Split the provider-agnostic message list into an Anthropic `system`
    /// string plus the remaining turn-taking messages.
    fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts = Vec::new();
        let mut rest = Vec::new();
        for m in messages {
            if m.role == "system" {
                if let Some(c) = &m.content {
                    system_parts.push(c.clone());
                }
            } else {
                rest.push(m);
            }
        }
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, rest)
    }

    fn build_messages(messages: &[&Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                if msg.role == "tool" {
                    json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                            "content": msg.content.clone().unwrap_or_default(),
                        }]
                    })
                } else if msg.role == "assistant" && msg.tool_calls.is_some() {
                    let mut blocks = Vec::new();
                    if let Some(text) = &msg.content {
                        if !text.is_empty() {
                            blocks.push(json!({"type": "text", "text": text}));
                        }
                    }
                    for tc in msg.tool_calls.iter().flatten() {
                        let input: Value =
                            serde_json::from_str(&tc.function.arguments).unwrap_or(json!({}));
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.function.name,
                            "input": input,
                        }));
                    }
                    json!({"role": "assistant", "content": blocks})
                } else {
                    json!({
                        "role": if msg.role == "assistant" { "assistant" } else { "user" },
                        "content": msg.content.clone().unwrap_or_default(),
                    })
                }
            })
            .collect()
    }

    fn build_tools(tools: &[Tool]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "input_schema": t.function.parameters,
                })
            })
            .collect()
    }

    fn build_tool_choice(choice: &ToolChoice) -> Option<Value> {
        match choice {
            ToolChoice::Auto => None,
            ToolChoice::Required => Some(json!({"type": "any"})),
            ToolChoice::Tool(name) => Some(json!({"type": "tool", "name": name})),
        }
    }

    fn parse_response(body: &str, request_id: &str, duration_ms: u64) -> Result<ChatResult> {
        let data: Value =
            serde_json::from_str(body).map_err(|e| anyhow!("failed to parse response: {e}"))?;

        let blocks = data["content"].as_array().cloned().unwrap_or_default();
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(t) = block["text"].as_str() {
                        text_parts.push(t.to_string());
                    }
                }
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        item_id: None,
                        call_type: "function".to_string(),
                        function: FunctionCall {
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            arguments: block["input"].to_string(),
                        },
                        thought_signature: None,
                    });
                }
                _ => {}
            }
        }

        let usage = data.get("usage").map(|u| Usage {
            prompt_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: (u["input_tokens"].as_u64().unwrap_or(0)
                + u["output_tokens"].as_u64().unwrap_or(0)) as u32,
            prompt_cache_hit_tokens: u["cache_read_input_tokens"].as_u64().map(|v| v as u32),
            prompt_cache_miss_tokens: u["cache_creation_input_tokens"].as_u64().map(|v| v as u32),
        });

        Ok(ChatResult {
            request_id: request_id.to_string(),
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            reasoning_content: None,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            usage,
            duration_ms,
        })
    }

    #[instrument(skip(self, messages, tools), fields(request_id, model = %self.model, message_count = messages.len()))]
    async fn send(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        choice: ToolChoice,
    ) -> Result<ChatResult> {
        let request_id = Uuid::new_v4().to_string();
        let start_time = Instant::now();
        Span::current().record("request_id", &request_id);

        let (system, rest) = Self::split_system(&messages);
        let mut body = json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": Self::build_messages(&rest),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(tools) = &tools {
            body["tools"] = json!(Self::build_tools(tools));
            if let Some(tc) = Self::build_tool_choice(&choice) {
                body["tool_choice"] = tc;
            }
        }

        info!(
            request_id = %request_id,
            message_count = rest.len(),
            tool_count = tools.as_ref().map(|t| t.len()).unwrap_or(0),
            model = %self.model,
            "Starting Anthropic chat request"
        );

        let payload = serde_json::to_string(&body)?;
        debug!(request_id = %request_id, "Anthropic request: {}", payload);

        let url = format!("{}/messages", self.base_url);
        let response_body = self
            .http
            .execute_with_retry(
                &request_id,
                &url,
                &[
                    ("x-api-key", self.api_key.as_str()),
                    ("anthropic-version", API_VERSION),
                ],
                payload,
            )
            .await?;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let result = Self::parse_response(&response_body, &request_id, duration_ms)?;

        if let Some(ref u) = result.usage {
            crate::llm::logging::log_usage(&request_id, "Anthropic", u);
        }
        if let Some(ref tcs) = result.tool_calls {
            crate::llm::logging::log_tool_calls(&request_id, "Anthropic", tcs);
        }
        crate::llm::logging::log_completion(
            &request_id,
            "Anthropic",
            duration_ms,
            result.content.as_ref().map(|c| c.len()).unwrap_or(0),
            0,
            result.tool_calls.as_ref().map(|t| t.len()).unwrap_or(0),
        );

        Ok(result)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider_type(&self) -> Provider {
        Provider::Anthropic
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn chat(&self, messages: Vec<Message>, tools: Option<Vec<Tool>>) -> Result<ChatResult> {
        self.send(messages, tools, ToolChoice::Auto).await
    }

    async fn chat_with_choice(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        choice: ToolChoice,
    ) -> Result<ChatResult> {
        self.send(messages, tools, choice).await
    }
}
