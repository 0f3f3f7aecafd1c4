// src/llm/tier.rs
// C2: Tier Router — maps a logical operation to one of three tiers, issues
// structured tool-use calls, and tracks cost.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ForgeError, Result};
use crate::llm::circuit_breaker::CircuitBreaker;
use crate::llm::pricing::get_pricing;
use crate::llm::provider::LlmClient;
use crate::llm::{Message, Tool, ToolCall, ToolChoice};

/// One of three abstraction levels of model usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    /// Judgment.
    Opus,
    /// Supervision.
    Sonnet,
    /// Labor — explicitly allowed to resolve to a non-Anthropic provider.
    Haiku,
}

/// Closed set of ~14 logical operation names the engine performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    ClassifyTask,
    ForemanSynthesis,
    FileDiscovery,
    PatternExtraction,
    DependencyMapping,
    ConstraintIdentification,
    WebResearch,
    DocumentationReading,
    CodeGeneration,
    SelfHealRepair,
    ResolveStuckPoint,
    ValidationToolSynthesis,
    QualityReview,
    ArchitectureSummary,
}

impl Operation {
    /// Default tier binding for each logical operation. Callers
    /// may override per-operation via `TierRouter::with_override`.
    pub fn default_tier(self) -> Tier {
        use Operation::*;
        match self {
            ClassifyTask => Tier::Haiku,
            ForemanSynthesis => Tier::Sonnet,
            FileDiscovery => Tier::Haiku,
            PatternExtraction => Tier::Haiku,
            DependencyMapping => Tier::Haiku,
            ConstraintIdentification => Tier::Haiku,
            WebResearch => Tier::Haiku,
            DocumentationReading => Tier::Haiku,
            CodeGeneration => Tier::Sonnet,
            SelfHealRepair => Tier::Sonnet,
            ResolveStuckPoint => Tier::Opus,
            ValidationToolSynthesis => Tier::Sonnet,
            QualityReview => Tier::Sonnet,
            ArchitectureSummary => Tier::Haiku,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub operation: Operation,
    pub system_prompt: String,
    pub user_prompt: String,
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CallRequest {
    pub fn new(operation: Operation, system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            operation,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }
}

/// Provider-independent result of a tier-routed call.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub tier: Tier,
    pub model: String,
}

#[derive(Debug, Clone, Default)]
struct CostAccumulator {
    spent_usd: f64,
    call_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCost {
    pub spent_usd: f64,
    pub percent: f64,
    pub call_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostDistribution {
    pub per_tier: HashMap<Tier, TierCost>,
    pub total_usd: f64,
}

/// Maps logical operations to tiers, issues structured tool-use calls
/// through the bound client for each tier, and tracks cost. No retries or
/// backoff inside the router — callers decide.
pub struct TierRouter {
    clients: HashMap<Tier, Arc<dyn LlmClient>>,
    overrides: Mutex<HashMap<Operation, Tier>>,
    costs: Mutex<HashMap<Tier, CostAccumulator>>,
    total_calls: AtomicU64,
    circuit_breaker: CircuitBreaker,
}

impl TierRouter {
    pub fn new(clients: HashMap<Tier, Arc<dyn LlmClient>>) -> Self {
        Self {
            clients,
            overrides: Mutex::new(HashMap::new()),
            costs: Mutex::new(HashMap::new()),
            total_calls: AtomicU64::new(0),
            circuit_breaker: CircuitBreaker::new(),
        }
    }

    /// Override the tier an operation resolves to (config `[tiers]` table).
    pub fn set_override(&self, operation: Operation, tier: Tier) {
        if let Ok(mut guard) = self.overrides.lock() {
            guard.insert(operation, tier);
        }
    }

    pub fn tier_for(&self, operation: Operation) -> Tier {
        self.overrides
            .lock()
            .ok()
            .and_then(|g| g.get(&operation).copied())
            .unwrap_or_else(|| operation.default_tier())
    }

    /// Issue a structured tool-use call for `request.operation`'s resolved
    /// tier. `tool_choice = Tool(name)` is honored by the adapter; if the
    /// provider returns no tool call, `tool_calls` is simply empty — callers
    /// handle that.
    pub async fn call(&self, request: CallRequest) -> Result<CallResult> {
        let messages = vec![
            Message::system(request.system_prompt.clone()),
            Message::user(request.user_prompt.clone()),
        ];
        self.call_messages(
            request.operation,
            messages,
            request.tools,
            request.tool_choice,
        )
        .await
    }

    /// Same contract as `call`, but for the Worker Runtime's multi-turn
    /// exploration loop, which needs to feed a running
    /// transcript back as message history rather than a single user turn.
    pub async fn call_messages(
        &self,
        operation: Operation,
        messages: Vec<Message>,
        tools: Vec<Tool>,
        tool_choice: ToolChoice,
    ) -> Result<CallResult> {
        let tier = self.tier_for(operation);
        let client = self
            .clients
            .get(&tier)
            .ok_or_else(|| ForgeError::LlmError(format!("no client bound for tier {tier}")))?
            .clone();
        let provider = client.provider_type();

        if !self.circuit_breaker.is_available(provider) {
            return Err(ForgeError::LlmError(format!(
                "{provider} circuit is open — tier {tier} temporarily unavailable"
            )));
        }

        let tools_opt = if tools.is_empty() { None } else { Some(tools) };

        info!(
            operation = %operation,
            tier = %tier,
            model = %client.model_name(),
            "tier router dispatching call"
        );

        let result = match client
            .chat_with_choice(messages, tools_opt, tool_choice.clone())
            .await
        {
            Ok(result) => {
                self.circuit_breaker.record_success(provider);
                result
            }
            Err(e) => {
                self.circuit_breaker.record_failure(provider);
                return Err(ForgeError::LlmError(e.to_string()));
            }
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let usage = client.normalize_usage(&result);
        let pricing = get_pricing(client.provider_type(), &client.model_name());
        let cost = pricing
            .map(|p| {
                p.calculate_cost(
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    result.usage.as_ref().and_then(|u| u.prompt_cache_hit_tokens),
                )
            })
            .unwrap_or(0.0);

        {
            let mut guard = self
                .costs
                .lock()
                .map_err(|_| ForgeError::InfrastructureError("cost accumulator poisoned".into()))?;
            let entry = guard.entry(tier).or_default();
            entry.spent_usd += cost;
            entry.call_count += 1;
        }

        let tool_calls = result.tool_calls.clone().unwrap_or_default();
        if matches!(tool_choice, ToolChoice::Tool(_)) && tool_calls.is_empty() {
            warn!(operation = %operation, "forced tool choice returned no tool call");
        }

        Ok(CallResult {
            text: result.content.clone(),
            tool_calls,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost_usd: cost,
            latency_ms: result.duration_ms,
            tier,
            model: client.model_name(),
        })
    }

    /// Absolute and percentage cost breakdown per tier.
    pub fn cost_distribution(&self) -> CostDistribution {
        let guard = self.costs.lock().unwrap_or_else(|e| e.into_inner());
        let total_usd: f64 = guard.values().map(|c| c.spent_usd).sum();
        let per_tier = guard
            .iter()
            .map(|(tier, acc)| {
                let percent = if total_usd > 0.0 {
                    (acc.spent_usd / total_usd) * 100.0
                } else {
                    0.0
                };
                (
                    *tier,
                    TierCost {
                        spent_usd: acc.spent_usd,
                        percent,
                        call_count: acc.call_count,
                    },
                )
            })
            .collect();
        CostDistribution { per_tier, total_usd }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResult, Provider};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FakeClient {
        provider: Provider,
        model: String,
        forced_tool_call: StdMutex<Option<ToolCall>>,
    }

    #[async_trait]
    impl LlmClient for FakeClient {
        fn provider_type(&self) -> Provider {
            self.provider
        }
        fn model_name(&self) -> String {
            self.model.clone()
        }
        async fn chat(&self, _messages: Vec<Message>, _tools: Option<Vec<Tool>>) -> anyhow::Result<ChatResult> {
            Ok(ChatResult {
                request_id: "r1".into(),
                content: Some("done".into()),
                reasoning_content: None,
                tool_calls: self.forced_tool_call.lock().unwrap().clone().map(|t| vec![t]),
                usage: Some(crate::llm::Usage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                    prompt_cache_hit_tokens: None,
                    prompt_cache_miss_tokens: None,
                }),
                duration_ms: 10,
            })
        }
    }

    struct FailingClient {
        provider: Provider,
        model: String,
    }

    #[async_trait]
    impl LlmClient for FailingClient {
        fn provider_type(&self) -> Provider {
            self.provider
        }
        fn model_name(&self) -> String {
            self.model.clone()
        }
        async fn chat(&self, _messages: Vec<Message>, _tools: Option<Vec<Tool>>) -> anyhow::Result<ChatResult> {
            Err(anyhow::anyhow!("simulated provider outage"))
        }
    }

    fn router_with_fake() -> TierRouter {
        let mut clients: HashMap<Tier, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(
            Tier::Haiku,
            Arc::new(FakeClient {
                provider: Provider::Labor,
                model: "deepseek-chat".into(),
                forced_tool_call: StdMutex::new(None),
            }),
        );
        clients.insert(
            Tier::Sonnet,
            Arc::new(FakeClient {
                provider: Provider::Anthropic,
                model: "claude-sonnet-4-6".into(),
                forced_tool_call: StdMutex::new(None),
            }),
        );
        TierRouter::new(clients)
    }

    #[test]
    fn default_tier_bindings_match_spec() {
        assert_eq!(Operation::ResolveStuckPoint.default_tier(), Tier::Opus);
        assert_eq!(Operation::CodeGeneration.default_tier(), Tier::Sonnet);
        assert_eq!(Operation::FileDiscovery.default_tier(), Tier::Haiku);
    }

    #[tokio::test]
    async fn call_accumulates_cost_per_tier() {
        let router = router_with_fake();
        let req = CallRequest::new(Operation::FileDiscovery, "sys", "user");
        router.call(req).await.unwrap();
        let dist = router.cost_distribution();
        let haiku = dist.per_tier.get(&Tier::Haiku).unwrap();
        assert_eq!(haiku.call_count, 1);
        assert!(haiku.spent_usd > 0.0);
        assert!((dist.total_usd - haiku.spent_usd).abs() < 1e-9);
    }

    #[tokio::test]
    async fn override_changes_resolved_tier() {
        let router = router_with_fake();
        router.set_override(Operation::FileDiscovery, Tier::Sonnet);
        assert_eq!(router.tier_for(Operation::FileDiscovery), Tier::Sonnet);
    }

    #[tokio::test]
    async fn missing_client_for_tier_errors() {
        let clients: HashMap<Tier, Arc<dyn LlmClient>> = HashMap::new();
        let router = TierRouter::new(clients);
        let req = CallRequest::new(Operation::CodeGeneration, "sys", "user");
        assert!(router.call(req).await.is_err());
    }

    #[tokio::test]
    async fn repeated_provider_failures_trip_the_circuit() {
        let mut clients: HashMap<Tier, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(
            Tier::Haiku,
            Arc::new(FailingClient {
                provider: Provider::Labor,
                model: "deepseek-chat".into(),
            }),
        );
        let router = TierRouter::new(clients);

        // Circuit breaker trips after 3 failures within its tracking window.
        for _ in 0..3 {
            let err = router
                .call(CallRequest::new(Operation::FileDiscovery, "s", "u"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("simulated provider outage"));
        }

        let err = router
            .call(CallRequest::new(Operation::FileDiscovery, "s", "u"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("circuit is open"));
    }

    #[tokio::test]
    async fn cost_distribution_percentages_sum_to_100() {
        let router = router_with_fake();
        router
            .call(CallRequest::new(Operation::FileDiscovery, "s", "u"))
            .await
            .unwrap();
        router
            .call(CallRequest::new(Operation::CodeGeneration, "s", "u"))
            .await
            .unwrap();
        let dist = router.cost_distribution();
        let sum_pct: f64 = dist.per_tier.values().map(|t| t.percent).sum();
        assert!((sum_pct - 100.0).abs() < 0.01);
    }
}
