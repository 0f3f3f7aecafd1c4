// src/workers/runtime.rs
// C4: Worker Runtime — multi-turn tool-use loop that forces a
// `submit_result` tool call and validates it against a declared schema
//.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{Message, Operation, TierRouter, ToolCall, ToolChoice};
use crate::tools::{self, submit_result_tool_schema};
use crate::workers::schema;

/// A worker is parameterized by operation, result schema, explore flag,
/// turn cap, system prompt.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub operation: Operation,
    pub system_prompt: String,
    pub can_explore: bool,
    pub max_turns: u32,
    pub result_schema: Value,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerMetrics {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub turns: u32,
    pub exploration_tool_calls: u32,
}

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub confidence: f64,
    pub error: Option<String>,
    pub metrics: WorkerMetrics,
}

impl WorkerOutcome {
    fn failure(error: impl Into<String>, metrics: WorkerMetrics) -> Self {
        Self {
            success: false,
            result: None,
            confidence: 0.0,
            error: Some(error.into()),
            metrics,
        }
    }
}

/// Execute `spec` against `project_root`, returning either a validated
/// result or a structured failure.
pub async fn execute(
    router: &TierRouter,
    project_root: &Path,
    spec: &WorkerSpec,
    user_prompt: String,
) -> WorkerOutcome {
    let mut metrics = WorkerMetrics::default();

    if !spec.can_explore {
        return execute_single_turn(router, spec, user_prompt, &mut metrics).await;
    }

    execute_exploration(router, project_root, spec, user_prompt, &mut metrics).await
}

async fn execute_single_turn(
    router: &TierRouter,
    spec: &WorkerSpec,
    user_prompt: String,
    metrics: &mut WorkerMetrics,
) -> WorkerOutcome {
    let request = crate::llm::CallRequest::new(spec.operation, spec.system_prompt.clone(), user_prompt)
        .with_tools(vec![submit_result_tool_schema()])
        .with_tool_choice(ToolChoice::Tool("submit_result".to_string()));

    let call_result = match router.call(request).await {
        Ok(r) => r,
        Err(e) => return WorkerOutcome::failure(format!("LLM call failed: {e}"), metrics.clone()),
    };

    metrics.turns = 1;
    accumulate(metrics, &call_result);

    extract_and_validate(&call_result.tool_calls, spec, metrics.clone())
}

async fn execute_exploration(
    router: &TierRouter,
    project_root: &Path,
    spec: &WorkerSpec,
    user_prompt: String,
    metrics: &mut WorkerMetrics,
) -> WorkerOutcome {
    let mut messages = vec![
        Message::system(spec.system_prompt.clone()),
        Message::user(user_prompt),
    ];
    let tools = tools::exploration_tools();

    for turn in 1..=spec.max_turns {
        let is_last_turn = turn == spec.max_turns;
        let choice = if is_last_turn {
            ToolChoice::Tool("submit_result".to_string())
        } else {
            ToolChoice::Auto
        };

        let call_result = match router
            .call_messages(spec.operation, messages.clone(), tools.clone(), choice)
            .await
        {
            Ok(r) => r,
            Err(e) => return WorkerOutcome::failure(format!("LLM call failed: {e}"), metrics.clone()),
        };

        metrics.turns = turn;
        accumulate(metrics, &call_result);

        if call_result.tool_calls.is_empty() {
            return WorkerOutcome::failure(
                "assistant returned no tool calls during exploration",
                metrics.clone(),
            );
        }

        if let Some(submit) = call_result
            .tool_calls
            .iter()
            .find(|tc| tc.function.name == "submit_result")
        {
            return extract_and_validate(std::slice::from_ref(submit), spec, metrics.clone());
        }

        // Record the assistant turn, then execute each exploration tool
        // call and feed results back.
        let mut assistant_msg = Message::assistant(call_result.text.clone(), None);
        assistant_msg.tool_calls = Some(call_result.tool_calls.clone());
        messages.push(assistant_msg);

        for tc in &call_result.tool_calls {
            metrics.exploration_tool_calls += 1;
            let input: Value = serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
            let tool_result = tools::dispatch(project_root, &tc.function.name, &input);
            let output_text = match tool_result {
                Some(r) if r.success => r.output,
                Some(r) => format!("error: {}", r.error.unwrap_or_default()),
                None => format!("unknown tool: {}", tc.function.name),
            };
            debug!(tool = %tc.function.name, "exploration tool executed");
            messages.push(Message::tool_result(tc.id.clone(), output_text));
        }
    }

    WorkerOutcome::failure(
        format!("max turns ({}) reached without submit_result", spec.max_turns),
        metrics.clone(),
    )
}

fn accumulate(metrics: &mut WorkerMetrics, call: &crate::llm::CallResult) {
    metrics.input_tokens += call.input_tokens;
    metrics.output_tokens += call.output_tokens;
    metrics.cost_usd += call.cost_usd;
    metrics.latency_ms += call.latency_ms;
}

fn extract_and_validate(
    tool_calls: &[ToolCall],
    spec: &WorkerSpec,
    metrics: WorkerMetrics,
) -> WorkerOutcome {
    let submit = match tool_calls.iter().find(|tc| tc.function.name == "submit_result") {
        Some(tc) => tc,
        None => return WorkerOutcome::failure("no submit_result tool call present", metrics),
    };

    let args: Value = match serde_json::from_str(&submit.function.arguments) {
        Ok(v) => v,
        Err(e) => return WorkerOutcome::failure(format!("schema invalid: malformed JSON: {e}"), metrics),
    };

    let result = args.get("result").cloned().unwrap_or(Value::Null);
    // Confidence defaults to 50 when absent.
    let confidence = args.get("confidence").and_then(|c| c.as_f64()).unwrap_or(50.0);

    if let Err(e) = schema::validate(&result, &spec.result_schema) {
        warn!(error = %e, "worker result failed schema validation");
        return WorkerOutcome::failure(format!("schema invalid: {e}"), metrics);
    }

    WorkerOutcome {
        success: true,
        result: Some(result),
        confidence,
        error: None,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResult, FunctionCall, LlmClient, Provider, Tool, Usage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct ScriptedClient {
        responses: std::sync::Mutex<Vec<ChatResult>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider_type(&self) -> Provider {
            Provider::Anthropic
        }
        fn model_name(&self) -> String {
            "claude-sonnet-4-6".into()
        }
        async fn chat(&self, _m: Vec<Message>, _t: Option<Vec<Tool>>) -> anyhow::Result<ChatResult> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
        async fn chat_with_choice(
            &self,
            _m: Vec<Message>,
            _t: Option<Vec<Tool>>,
            _c: ToolChoice,
        ) -> anyhow::Result<ChatResult> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn submit_call(result: Value, confidence: f64) -> ToolCall {
        ToolCall {
            id: "tc1".into(),
            item_id: None,
            call_type: "function".into(),
            function: FunctionCall {
                name: "submit_result".into(),
                arguments: json!({"result": result, "confidence": confidence}).to_string(),
            },
            thought_signature: None,
        }
    }

    fn usage() -> Usage {
        Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            prompt_cache_hit_tokens: None,
            prompt_cache_miss_tokens: None,
        }
    }

    fn router_with(responses: Vec<ChatResult>) -> TierRouter {
        let mut clients: HashMap<crate::llm::Tier, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(
            crate::llm::Tier::Haiku,
            Arc::new(ScriptedClient {
                responses: std::sync::Mutex::new(responses),
            }),
        );
        TierRouter::new(clients)
    }

    #[tokio::test]
    async fn single_turn_validates_successfully() {
        let call = submit_call(json!({"confidence": 80}), 80.0);
        let router = router_with(vec![ChatResult {
            request_id: "r".into(),
            content: None,
            reasoning_content: None,
            tool_calls: Some(vec![call]),
            usage: Some(usage()),
            duration_ms: 5,
        }]);
        let spec = WorkerSpec {
            operation: Operation::FileDiscovery,
            system_prompt: "sys".into(),
            can_explore: false,
            max_turns: 1,
            result_schema: json!({"type": "object"}),
        };
        let dir = TempDir::new().unwrap();
        let outcome = execute(&router, dir.path(), &spec, "do it".into()).await;
        assert!(outcome.success);
        assert_eq!(outcome.confidence, 80.0);
    }

    #[tokio::test]
    async fn schema_validation_failure_reported() {
        let call = submit_call(json!({"wrong": true}), 50.0);
        let router = router_with(vec![ChatResult {
            request_id: "r".into(),
            content: None,
            reasoning_content: None,
            tool_calls: Some(vec![call]),
            usage: Some(usage()),
            duration_ms: 5,
        }]);
        let spec = WorkerSpec {
            operation: Operation::FileDiscovery,
            system_prompt: "sys".into(),
            can_explore: false,
            max_turns: 1,
            result_schema: json!({"type": "object", "required": ["confidence"]}),
        };
        let dir = TempDir::new().unwrap();
        let outcome = execute(&router, dir.path(), &spec, "do it".into()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("schema invalid"));
    }

    #[tokio::test]
    async fn missing_submit_result_after_max_turns_fails() {
        let router = router_with(vec![ChatResult {
            request_id: "r".into(),
            content: Some("thinking".into()),
            reasoning_content: None,
            tool_calls: None,
            usage: Some(usage()),
            duration_ms: 5,
        }]);
        let spec = WorkerSpec {
            operation: Operation::FileDiscovery,
            system_prompt: "sys".into(),
            can_explore: true,
            max_turns: 1,
            result_schema: json!({"type": "object"}),
        };
        let dir = TempDir::new().unwrap();
        let outcome = execute(&router, dir.path(), &spec, "find files".into()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no tool calls"));
    }

    #[tokio::test]
    async fn exploration_feeds_tool_results_back_and_submits() {
        let glob_call = ToolCall {
            id: "tc_glob".into(),
            item_id: None,
            call_type: "function".into(),
            function: FunctionCall {
                name: "glob".into(),
                arguments: json!({"pattern": "*.rs"}).to_string(),
            },
            thought_signature: None,
        };
        let submit = submit_call(json!({"confidence": 90}), 90.0);
        let router = router_with(vec![
            ChatResult {
                request_id: "r1".into(),
                content: None,
                reasoning_content: None,
                tool_calls: Some(vec![glob_call]),
                usage: Some(usage()),
                duration_ms: 5,
            },
            ChatResult {
                request_id: "r2".into(),
                content: None,
                reasoning_content: None,
                tool_calls: Some(vec![submit]),
                usage: Some(usage()),
                duration_ms: 5,
            },
        ]);
        let spec = WorkerSpec {
            operation: Operation::FileDiscovery,
            system_prompt: "sys".into(),
            can_explore: true,
            max_turns: 3,
            result_schema: json!({"type": "object"}),
        };
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main(){}").unwrap();
        let outcome = execute(&router, dir.path(), &spec, "find files".into()).await;
        assert!(outcome.success);
        assert_eq!(outcome.metrics.turns, 2);
        assert_eq!(outcome.metrics.exploration_tool_calls, 1);
    }
}
