// src/workers/pattern_extraction.rs
// C5 worker #2: PatternExtraction — explore (<=10 turns) to surface naming,
// organization, testing, and error-handling conventions.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Operation;
use crate::workers::runtime::WorkerSpec;

pub const MAX_TURNS: u32 = 10;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Conventions {
    pub naming: Option<String>,
    pub file_organization: Option<String>,
    pub error_handling: Option<String>,
    pub testing: Option<String>,
    pub imports: Option<String>,
    pub state_management: Option<String>,
    pub data_fetching: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatternExtractionResult {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub conventions: Conventions,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
}

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "patterns": {"type": "array", "items": {"type": "string"}},
            "conventions": {
                "type": "object",
                "properties": {
                    "naming": {"type": "string"},
                    "fileOrganization": {"type": "string"},
                    "errorHandling": {"type": "string"},
                    "testing": {"type": "string"},
                    "imports": {"type": "string"},
                    "stateManagement": {"type": "string"},
                    "dataFetching": {"type": "string"}
                }
            },
            "antiPatterns": {"type": "array", "items": {"type": "string"}}
        }
    })
}

pub fn spec(system_prompt: impl Into<String>) -> WorkerSpec {
    WorkerSpec {
        operation: Operation::PatternExtraction,
        system_prompt: system_prompt.into(),
        can_explore: true,
        max_turns: MAX_TURNS,
        result_schema: schema(),
    }
}

pub fn default_system_prompt() -> String {
    "You are the pattern extraction worker. Explore the project's source and \
     config to identify naming, file organization, testing, and error-handling \
     conventions, then call submit_result."
        .to_string()
}

pub fn build_user_prompt(request: &str, sample_paths: &[String]) -> String {
    format!(
        "Request: {request}\nSample files already known relevant: {}\n\n\
         Identify the conventions an implementation of this request must follow.",
        sample_paths.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_conventions_default_to_none() {
        let v: PatternExtractionResult = serde_json::from_value(json!({"patterns": ["x"]})).unwrap();
        assert!(v.conventions.naming.is_none());
    }
}
