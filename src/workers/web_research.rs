// src/workers/web_research.rs
// C5 worker #5: WebResearch — single-turn, no exploration tools.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Operation;
use crate::workers::runtime::WorkerSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    #[serde(rename = "med")]
    Medium,
    Low,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Finding {
    pub topic: String,
    pub content: String,
    pub relevance: Relevance,
    pub caveats: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Recommendation {
    pub recommendation: String,
    pub rationale: String,
    pub tradeoffs: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unknown {
    pub topic: String,
    pub reason: String,
    #[serde(default)]
    pub suggested_sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WebResearchResult {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub unknowns: Vec<Unknown>,
}

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["topic", "content", "relevance"],
                    "properties": {
                        "topic": {"type": "string"},
                        "content": {"type": "string"},
                        "relevance": {"type": "string", "enum": ["high", "med", "low"]},
                        "caveats": {"type": "string"}
                    }
                }
            },
            "recommendations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["recommendation", "rationale"],
                    "properties": {
                        "recommendation": {"type": "string"},
                        "rationale": {"type": "string"},
                        "tradeoffs": {"type": "string"}
                    }
                }
            },
            "unknowns": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["topic", "reason"],
                    "properties": {
                        "topic": {"type": "string"},
                        "reason": {"type": "string"},
                        "suggestedSources": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        }
    })
}

/// Single-turn, no tools except the terminal `submit_result`.
pub fn spec(system_prompt: impl Into<String>) -> WorkerSpec {
    WorkerSpec {
        operation: Operation::WebResearch,
        system_prompt: system_prompt.into(),
        can_explore: false,
        max_turns: 1,
        result_schema: schema(),
    }
}

pub fn default_system_prompt() -> String {
    "You are the web research worker. Using only your training knowledge (no \
     live browsing is available), summarize findings, recommendations, and \
     unknowns relevant to the request, then call submit_result."
        .to_string()
}

pub fn build_user_prompt(request: &str) -> String {
    format!("Research question: {request}\n\nProvide findings, recommendations, and unknowns.")
}
