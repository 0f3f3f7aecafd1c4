// src/workers/documentation_reader.rs
// C5 worker #6: DocumentationReader — single-turn.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Operation;
use crate::workers::runtime::WorkerSpec;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationReaderResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub relevant_sections: Vec<String>,
    #[serde(default)]
    pub api_references: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

pub fn schema() -> Value {
    let string_array = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string"},
            "relevantSections": string_array,
            "apiReferences": string_array,
            "examples": string_array,
            "warnings": string_array,
        }
    })
}

/// Single-turn.
pub fn spec(system_prompt: impl Into<String>) -> WorkerSpec {
    WorkerSpec {
        operation: Operation::DocumentationReading,
        system_prompt: system_prompt.into(),
        can_explore: false,
        max_turns: 1,
        result_schema: schema(),
    }
}

pub fn default_system_prompt() -> String {
    "You are the documentation reader worker. Summarize the provided \
     documentation content relevant to the request, surfacing applicable \
     API references, examples, and warnings, then call submit_result."
        .to_string()
}

pub fn build_user_prompt(request: &str, doc_content: &str) -> String {
    format!("Request: {request}\n\nDocumentation:\n{doc_content}\n\nSummarize what is relevant.")
}
