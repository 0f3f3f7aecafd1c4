// src/workers/constraint_identifier.rs
// C5 worker #4: ConstraintIdentifier — explore (<=8 turns) to list type,
// test, lint, build, and API constraints.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Operation;
use crate::workers::runtime::WorkerSpec;

pub const MAX_TURNS: u32 = 8;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintIdentifierResult {
    #[serde(default)]
    pub type_constraints: Vec<String>,
    #[serde(default)]
    pub test_constraints: Vec<String>,
    #[serde(default)]
    pub lint_constraints: Vec<String>,
    #[serde(default)]
    pub build_constraints: Vec<String>,
    #[serde(default)]
    pub api_constraints: Vec<String>,
}

pub fn schema() -> Value {
    let string_array = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "properties": {
            "typeConstraints": string_array,
            "testConstraints": string_array,
            "lintConstraints": string_array,
            "buildConstraints": string_array,
            "apiConstraints": string_array,
        }
    })
}

pub fn spec(system_prompt: impl Into<String>) -> WorkerSpec {
    WorkerSpec {
        operation: Operation::ConstraintIdentification,
        system_prompt: system_prompt.into(),
        can_explore: true,
        max_turns: MAX_TURNS,
        result_schema: schema(),
    }
}

pub fn default_system_prompt() -> String {
    "You are the constraint identifier worker. Inspect tsconfig/package.json, \
     Cargo.toml, lint configs, and CI scripts to list the type, test, lint, \
     build, and API constraints that generated code must satisfy. Recognize \
     ESM / Node-resolution module settings and emit derived constraints about \
     import styles. Then call submit_result."
        .to_string()
}

pub fn build_user_prompt(request: &str) -> String {
    format!("Request: {request}\n\nIdentify the hard constraints this change must satisfy.")
}

/// Derived-constraint heuristic: "Must recognize ESM/Node-resolution
/// module setting and emit derived constraints about import styles."
pub fn derive_module_constraints(tsconfig_content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let lower = tsconfig_content.to_lowercase();
    if lower.contains("\"module\"") && (lower.contains("nodenext") || lower.contains("node16")) {
        out.push(
            "ESM/NodeNext module resolution: relative imports must include file extensions"
                .to_string(),
        );
    }
    if lower.contains("\"type\": \"module\"") || lower.contains("\"type\":\"module\"") {
        out.push("package.json declares ESM: use import/export, not require()".to_string());
    }
    out
}
