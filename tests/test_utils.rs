//! Shared test doubles for forge's end-to-end department-pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forge::llm::{ChatResult, FunctionCall, LlmClient, Message, Provider, Tier, TierRouter, Tool, ToolCall, ToolChoice};
use serde_json::Value;

/// A fake LLM client that replays a fixed, ordered script of responses.
/// Panics if asked for more responses than were scripted — tests should
/// script exactly the calls the pipeline under test is expected to make.
pub struct ScriptedClient {
    provider: Provider,
    model: String,
    responses: Mutex<Vec<ChatResult>>,
}

impl ScriptedClient {
    pub fn new(provider: Provider, model: impl Into<String>, responses: Vec<ChatResult>) -> Self {
        Self {
            provider,
            model: model.into(),
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn provider_type(&self) -> Provider {
        self.provider
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn chat(&self, _messages: Vec<Message>, _tools: Option<Vec<Tool>>) -> anyhow::Result<ChatResult> {
        let mut responses = self.responses.lock().expect("scripted client lock poisoned");
        if responses.is_empty() {
            anyhow::bail!("ScriptedClient exhausted: no more scripted responses");
        }
        Ok(responses.remove(0))
    }

    async fn chat_with_choice(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        _choice: ToolChoice,
    ) -> anyhow::Result<ChatResult> {
        self.chat(messages, tools).await
    }
}

fn usage(prompt: u32, completion: u32) -> forge::llm::Usage {
    forge::llm::Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
        prompt_cache_hit_tokens: None,
        prompt_cache_miss_tokens: None,
    }
}

/// Build a `ChatResult` carrying a single named tool call with the given
/// JSON arguments.
pub fn tool_call_response(tool_name: &str, arguments: Value) -> ChatResult {
    ChatResult {
        request_id: format!("req-{tool_name}"),
        content: None,
        reasoning_content: None,
        tool_calls: Some(vec![ToolCall {
            id: format!("tc-{tool_name}"),
            item_id: None,
            call_type: "function".into(),
            function: FunctionCall {
                name: tool_name.to_string(),
                arguments: arguments.to_string(),
            },
            thought_signature: None,
        }]),
        usage: Some(usage(100, 50)),
        duration_ms: 5,
    }
}

/// Build a `submit_result` response wrapping `result` at the given
/// confidence (0..100).
pub fn submit_result_response(result: Value, confidence: f64) -> ChatResult {
    tool_call_response(
        "submit_result",
        serde_json::json!({"result": result, "confidence": confidence}),
    )
}

/// Build a `submit_code_changes` response.
pub fn submit_code_changes_response(files: Value, explanation: &str) -> ChatResult {
    tool_call_response(
        "submit_code_changes",
        serde_json::json!({"files": files, "explanation": explanation}),
    )
}

/// Assemble a `TierRouter` with a scripted client behind each tier that has
/// scripted responses. Tiers with an empty response list are left
/// unregistered, so calls routed there fail with an `LlmError` — exercising
/// the engine's deterministic-fallback paths.
pub fn router_with_scripts(
    sonnet: Vec<ChatResult>,
    haiku: Vec<ChatResult>,
    opus: Vec<ChatResult>,
) -> Arc<TierRouter> {
    let mut clients: HashMap<Tier, Arc<dyn LlmClient>> = HashMap::new();
    if !sonnet.is_empty() {
        clients.insert(
            Tier::Sonnet,
            Arc::new(ScriptedClient::new(Provider::Anthropic, "claude-sonnet-4-6", sonnet)),
        );
    }
    if !haiku.is_empty() {
        clients.insert(
            Tier::Haiku,
            Arc::new(ScriptedClient::new(Provider::Labor, "deepseek-chat", haiku)),
        );
    }
    if !opus.is_empty() {
        clients.insert(
            Tier::Opus,
            Arc::new(ScriptedClient::new(Provider::Anthropic, "claude-opus-4-6", opus)),
        );
    }
    Arc::new(TierRouter::new(clients))
}
