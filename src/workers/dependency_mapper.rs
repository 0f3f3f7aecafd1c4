// src/workers/dependency_mapper.rs
// C5 worker #3: DependencyMapper — explore (<=10 turns) to map internal and
// external dependencies, entry points, and circular dependencies.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::llm::Operation;
use crate::workers::runtime::WorkerSpec;

pub const MAX_TURNS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Import,
    #[serde(rename = "type")]
    TypeDep,
    Runtime,
    Test,
}

impl DependencyType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::TypeDep => "type",
            Self::Runtime => "runtime",
            Self::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Dependency {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    #[serde(default)]
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDependency {
    pub name: String,
    #[serde(default)]
    pub used_by: Vec<String>,
    #[serde(default)]
    pub is_dev: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryPoint {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSeverity {
    Low,
    Medium,
    High,
}

impl CycleSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircularDependency {
    pub cycle: Vec<String>,
    pub severity: CycleSeverity,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DependencyMapperResult {
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub external_dependencies: Vec<ExternalDependency>,
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
    #[serde(default)]
    pub circular_dependencies: Vec<CircularDependency>,
}

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dependencies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["from", "to", "type"],
                    "properties": {
                        "from": {"type": "string"},
                        "to": {"type": "string"},
                        "type": {"type": "string", "enum": ["import", "type", "runtime", "test"]},
                        "imports": {"type": "array", "items": {"type": "string"}}
                    }
                }
            },
            "externalDependencies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "usedBy": {"type": "array", "items": {"type": "string"}},
                        "isDev": {"type": "boolean"}
                    }
                }
            },
            "entryPoints": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["path", "type", "description"],
                    "properties": {
                        "path": {"type": "string"},
                        "type": {"type": "string"},
                        "description": {"type": "string"}
                    }
                }
            },
            "circularDependencies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["cycle", "severity"],
                    "properties": {
                        "cycle": {"type": "array", "items": {"type": "string"}},
                        "severity": {"type": "string", "enum": ["low", "medium", "high"]}
                    }
                }
            }
        }
    })
}

pub fn spec(system_prompt: impl Into<String>) -> WorkerSpec {
    WorkerSpec {
        operation: Operation::DependencyMapping,
        system_prompt: system_prompt.into(),
        can_explore: true,
        max_turns: MAX_TURNS,
        result_schema: schema(),
    }
}

pub fn default_system_prompt() -> String {
    "You are the dependency mapper worker. Explore module imports to build a \
     dependency graph, list external dependencies, entry points, and any \
     circular dependencies, then call submit_result."
        .to_string()
}

pub fn build_user_prompt(request: &str, relevant_files: &[String]) -> String {
    format!(
        "Request: {request}\nKnown relevant files: {}\n\nMap the dependencies \
         touched by this request.",
        relevant_files.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_type_lowercase_roundtrip() {
        let d: Dependency = serde_json::from_value(json!({
            "from": "a.rs", "to": "b.rs", "type": "import"
        }))
        .unwrap();
        assert_eq!(d.dep_type, DependencyType::Import);
    }
}
