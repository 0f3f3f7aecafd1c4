// src/llm/openai_compat/request.rs
// OpenAI-compatible chat request builder, used by the labor tier.

use crate::llm::{Message, Tool, ToolChoice};
use serde::Serialize;
use serde_json::{Value, json};

/// Chat completion request (OpenAI-compatible format)
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// Create a new chat request with required fields
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Set tools for function calling, defaulting tool_choice to "auto".
    pub fn with_tools(mut self, tools: Option<Vec<Tool>>) -> Self {
        self.tools = tools;
        if self.tools.is_some() {
            self.tool_choice = Some(json!("auto"));
        }
        self
    }

    /// Constrain which tool the model may call, overriding the default
    /// "auto" set by `with_tools`. Backs the Worker Runtime's forced
    /// `submit_result` call.
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = match choice {
            ToolChoice::Auto => Some(json!("auto")),
            ToolChoice::Required => Some(json!("required")),
            ToolChoice::Tool(name) => Some(json!({
                "type": "function",
                "function": {"name": name},
            })),
        };
        self
    }

    /// Set maximum output tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature (0.0 to 2.0)
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_new() {
        let req = ChatRequest::new("test-model", vec![]);
        assert_eq!(req.model, "test-model");
        assert!(req.messages.is_empty());
        assert!(req.tools.is_none());
    }

    #[test]
    fn test_chat_request_builder() {
        let req = ChatRequest::new("model", vec![])
            .with_max_tokens(1000)
            .with_temperature(0.5);
        assert_eq!(req.max_tokens, Some(1000));
        assert_eq!(req.temperature, Some(0.5));
    }

    #[test]
    fn test_chat_request_forced_tool_choice() {
        let req = ChatRequest::new("model", vec![])
            .with_tools(Some(vec![]))
            .with_tool_choice(ToolChoice::Tool("submit_result".to_string()));
        let tc = req.tool_choice.unwrap();
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["name"], "submit_result");
    }

    #[test]
    fn test_chat_request_default_auto_tool_choice() {
        let req = ChatRequest::new("model", vec![]).with_tools(Some(vec![]));
        assert_eq!(req.tool_choice, Some(json!("auto")));
    }
}
