// src/workers/file_discovery.rs
// C5 worker #1: FileDiscovery — explore (<=10 turns) to recommend relevant
// and candidate-new files.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Operation;
use crate::task::Priority;
use crate::workers::runtime::WorkerSpec;

pub const MAX_TURNS: u32 = 10;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantFile {
    pub path: String,
    pub reason: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedNewFile {
    pub path: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileDiscoveryResult {
    #[serde(default)]
    pub relevant_files: Vec<RelevantFile>,
    #[serde(default)]
    pub suggested_new_files: Vec<SuggestedNewFile>,
}

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "relevantFiles": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["path", "reason"],
                    "properties": {
                        "path": {"type": "string"},
                        "reason": {"type": "string"},
                        "priority": {"type": "string", "enum": ["high", "medium", "low"]}
                    }
                }
            },
            "suggestedNewFiles": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["path", "purpose"],
                    "properties": {
                        "path": {"type": "string"},
                        "purpose": {"type": "string"}
                    }
                }
            }
        }
    })
}

pub fn spec(system_prompt: impl Into<String>) -> WorkerSpec {
    WorkerSpec {
        operation: Operation::FileDiscovery,
        system_prompt: system_prompt.into(),
        can_explore: true,
        max_turns: MAX_TURNS,
        result_schema: schema(),
    }
}

pub fn default_system_prompt() -> String {
    "You are the file discovery worker. Explore the project with glob/read/grep \
     to find files relevant to the request, then call submit_result with \
     relevantFiles (path, reason, priority) and suggestedNewFiles (path, purpose)."
        .to_string()
}

pub fn build_user_prompt(request: &str, keywords: &[String], project_type: &str) -> String {
    format!(
        "Request: {request}\nProject type: {project_type}\nKeywords: {}\n\n\
         Find the files that must be read or modified to satisfy this request.",
        keywords.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_with_default_priority() {
        let v: FileDiscoveryResult = serde_json::from_value(json!({
            "relevantFiles": [{"path": "a.rs", "reason": "entry point"}],
            "suggestedNewFiles": []
        }))
        .unwrap();
        assert_eq!(v.relevant_files[0].priority, Priority::Medium);
    }
}
