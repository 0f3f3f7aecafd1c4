// src/llm/labor/client.rs
// Haiku-class labor-tier client, speaking the OpenAI-compatible chat API.
// Spec §4.2 explicitly allows this tier to resolve to a non-Anthropic vendor.

use crate::llm::http_client::LlmHttpClient;
use crate::llm::openai_compat::{ChatRequest, parse_chat_response};
use crate::llm::provider::{LlmClient, Provider};
use crate::llm::{ChatResult, Message, Tool, ToolChoice, truncate_messages_to_default_budget};
use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;

const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct LaborClient {
    api_key: String,
    model: String,
    base_url: String,
    http: LlmHttpClient,
}

impl LaborClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let http = LlmHttpClient::new(Duration::from_secs(300), Duration::from_secs(30));
        Self {
            api_key,
            model,
            base_url,
            http,
        }
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

        let messages = truncate_messages_to_default_budget(messages);

        info!(
            request_id = %request_id,
            message_count = messages.len(),
            tool_count = tools.as_ref().map(|t| t.len()).unwrap_or(0),
            model = %self.model,
            "Starting labor-tier chat request"
        );

        let mut request = ChatRequest::new(&self.model, messages)
            .with_tools(tools)
            .with_max_tokens(DEFAULT_MAX_TOKENS);
        if !matches!(choice, ToolChoice::Auto) {
            request = request.with_tool_choice(choice);
        }

        let body = serde_json::to_string(&request)?;
        debug!(request_id = %request_id, "Labor-tier request: {}", body);

        let response_body = self
            .http
            .execute_with_retry(
                &request_id,
                &self.base_url,
                &[("Authorization", &format!("Bearer {}", self.api_key))],
                body,
            )
            .await?;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let result = parse_chat_response(&response_body, request_id.as_str(), duration_ms)?;

        if let Some(ref u) = result.usage {
            crate::llm::logging::log_usage(&request_id, "Labor", u);
        }
        if let Some(ref tcs) = result.tool_calls {
            crate::llm::logging::log_tool_calls(&request_id, "Labor", tcs);
        }
        crate::llm::logging::log_completion(
            &request_id,
            "Labor",
            duration_ms,
            result.content.as_ref().map(|c| c.len()).unwrap_or(0),
            result
                .reasoning_content
                .as_ref()
                .map(|r| r.len())
                .unwrap_or(0),
            result.tool_calls.as_ref().map(|t| t.len()).unwrap_or(0),
        );

        Ok(result)
    }
}

#[async_trait]
impl LlmClient for LaborClient {
    fn provider_type(&self) -> Provider {
        Provider::Labor
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    /// The labor tier targets smaller-context vendors; always truncate.
    fn context_budget(&self) -> u64 {
        crate::llm::CONTEXT_BUDGET
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
