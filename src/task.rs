// src/task.rs
// Core data model: Task, Classification, ContextPackage, ExecutionResult and
// the task state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::error::{ForgeError, Result};

/// Canonical lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    Intake,
    Classified,
    Preparing,
    Prepared,
    Executing,
    Reviewing,
    Completed,
    Blocked,
    Failed,
}

impl TaskState {
    /// Whether `to` is a legal transition from `self`.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Intake, Classified)
                | (Classified, Preparing)
                | (Preparing, Prepared)
                | (Preparing, Failed)
                | (Prepared, Executing)
                | (Executing, Reviewing)
                | (Executing, Blocked)
                | (Executing, Failed)
                | (Reviewing, Completed)
                | (Reviewing, Blocked)
                | (Blocked, Intake)
                | (Blocked, Classified)
                | (Blocked, Preparing)
                | (_, Blocked) // any in-flight state can be escalated
        )
    }
}

/// Department a classified task is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Department {
    Preparation,
    RAndD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectType {
    Feature,
    Bugfix,
    Greenfield,
    Refactor,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scope {
    Small,
    Medium,
    Large,
}

/// Output of the Plant Manager's intake classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub project_type: ProjectType,
    pub scope: Scope,
    pub department: Department,
    pub confidence: f64,
}

/// A single recorded state transition, part of `Task::state_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TaskState,
    pub to: TaskState,
    pub actor_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// An entry in `ContextPackage.codeContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
    pub reason: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskDescription {
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub scope_in: Vec<String>,
    pub scope_out: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Architecture {
    pub overview: String,
    pub relevant_components: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeContext {
    pub must_read: Vec<String>,
    pub must_not_modify: Vec<String>,
    pub related_examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Patterns {
    pub naming: Option<String>,
    pub file_organization: Option<String>,
    pub testing: Option<String>,
    pub error_handling: Option<String>,
    pub code_style: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Constraints {
    pub technical: Vec<String>,
    pub quality: Vec<String>,
    pub timeline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoricalContext {
    pub previous_attempts: Vec<String>,
    pub related_decisions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HumanSync {
    pub required_before: Vec<String>,
    pub ambiguities: Vec<String>,
}

/// Immutable contract between preparation and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPackage {
    pub id: String,
    pub project_type: ProjectType,
    pub prepared_by: String,
    pub task: TaskDescription,
    pub architecture: Architecture,
    pub code_context: CodeContext,
    pub patterns: Patterns,
    pub constraints: Constraints,
    pub risks: Vec<String>,
    pub history: HistoricalContext,
    pub human_sync: HumanSync,
}

/// Default per-package serialized-size budget.
pub const CONTEXT_PACKAGE_SIZE_BUDGET: usize = 50 * 1024;

impl ContextPackage {
    /// Deduplicate `mustRead` and `relatedExamples` by path, preserving the
    /// first occurrence's order.
    pub fn dedupe_paths(&mut self) {
        let mut seen = HashSet::new();
        self.code_context.must_read.retain(|p| seen.insert(p.clone()));
        let mut seen_examples = HashSet::new();
        self.code_context
            .related_examples
            .retain(|p| seen_examples.insert(p.clone()));
    }

    /// Validate the §3 invariants. `project_root` is used to check that
    /// every `mustRead` path exists and is a real file.
    pub fn validate(&self, project_root: &Path) -> Result<()> {
        if self.code_context.must_read.is_empty() && self.code_context.related_examples.is_empty()
        {
            return Err(ForgeError::ValidationError(
                "context package has no mustRead and no relatedExamples".into(),
            ));
        }

        let must_read: HashSet<&String> = self.code_context.must_read.iter().collect();
        let must_not_modify: HashSet<&String> = self.code_context.must_not_modify.iter().collect();
        let overlap: Vec<&&String> = must_read.intersection(&must_not_modify).collect();
        if !overlap.is_empty() {
            return Err(ForgeError::ValidationError(format!(
                "mustRead and mustNotModify overlap: {overlap:?}"
            )));
        }

        for path in &self.code_context.must_read {
            let full = project_root.join(path);
            match full.metadata() {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    return Err(ForgeError::ValidationError(format!(
                        "mustRead entry '{path}' is not a file"
                    )));
                }
                Err(_) => {
                    return Err(ForgeError::ValidationError(format!(
                        "mustRead entry '{path}' does not exist"
                    )));
                }
            }
        }

        let serialized = serde_json::to_string(self).map_err(ForgeError::Json)?;
        if serialized.len() > CONTEXT_PACKAGE_SIZE_BUDGET {
            return Err(ForgeError::ValidationError(format!(
                "context package serialized size {} exceeds budget {}",
                serialized.len(),
                CONTEXT_PACKAGE_SIZE_BUDGET
            )));
        }

        Ok(())
    }
}

/// Cost accounting split out by execution phase.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CostBreakdown {
    pub code_generation: f64,
    pub self_heal: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.code_generation + self.self_heal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePhase {
    CodeGeneration,
    FileOperation,
    Compilation,
    Validation,
    Infrastructure,
}

/// Produced by a classifier from a free-text error + phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredFailure {
    pub phase: FailurePhase,
    pub code: String,
    pub message: String,
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationSummary {
    pub total_tools: usize,
    pub passed: usize,
    pub results: Vec<ValidationResult>,
    pub overall_passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of the Execution Foreman.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_read: Vec<String>,
    pub compilation_passed: bool,
    pub compilation_attempts: u32,
    pub compilation_self_healed: bool,
    pub validation_passed: bool,
    pub validation_summary: Option<ValidationSummary>,
    pub notes: Vec<String>,
    pub error: Option<String>,
    pub structured_failure: Option<StructuredFailure>,
    pub cost_breakdown: CostBreakdown,
}

impl ExecutionResult {
    pub fn new_empty() -> Self {
        Self {
            success: false,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            files_read: Vec::new(),
            compilation_passed: false,
            compilation_attempts: 0,
            compilation_self_healed: false,
            validation_passed: false,
            validation_summary: None,
            notes: Vec::new(),
            error: None,
            structured_failure: None,
            cost_breakdown: CostBreakdown::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityResult {
    pub recommendation: QualityRecommendation,
    pub required_passed: bool,
    pub advisory_passed: bool,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QualityRecommendation {
    Approve,
    HumanReview,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub from: String,
    pub reason: String,
    pub suggested_options: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// The unit of work carried through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub raw_request: String,
    pub project_root: String,
    state: TaskState,
    pub classification: Option<Classification>,
    pub context_package: Option<ContextPackage>,
    pub execution_result: Option<ExecutionResult>,
    pub quality_result: Option<QualityResult>,
    pub escalation: Option<Escalation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    state_history: Vec<StateTransition>,
}

impl Task {
    pub fn new(raw_request: impl Into<String>, project_root: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            raw_request: raw_request.into(),
            project_root: project_root.into(),
            state: TaskState::Intake,
            classification: None,
            context_package: None,
            execution_result: None,
            quality_result: None,
            escalation: None,
            created_at: now,
            updated_at: now,
            state_history: Vec::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// The single owner of state transitions. Rejects illegal
    /// edges; every successful transition is appended to `state_history`
    /// with a monotonic timestamp.
    pub fn transition(
        &mut self,
        to: TaskState,
        actor_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(ForgeError::InputError(format!(
                "illegal task transition {:?} -> {:?}",
                self.state, to
            )));
        }
        let now = Utc::now();
        self.state_history.push(StateTransition {
            from: self.state,
            to,
            actor_id: actor_id.into(),
            reason: reason.into(),
            timestamp: now,
        });
        self.state = to;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transition_sequence_succeeds() {
        let mut t = Task::new("add a readme", "/tmp/proj");
        t.transition(TaskState::Classified, "plant_manager", "classified")
            .unwrap();
        t.transition(TaskState::Preparing, "preparation", "starting prep")
            .unwrap();
        t.transition(TaskState::Prepared, "preparation", "done")
            .unwrap();
        assert_eq!(t.state(), TaskState::Prepared);
        assert_eq!(t.state_history().len(), 3);
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut t = Task::new("add a readme", "/tmp/proj");
        let err = t.transition(TaskState::Completed, "x", "skip ahead");
        assert!(err.is_err());
        assert_eq!(t.state(), TaskState::Intake);
    }

    #[test]
    fn blocked_can_resume_to_intake() {
        let mut t = Task::new("req", "/tmp/proj");
        t.transition(TaskState::Blocked, "x", "escalate").unwrap();
        t.transition(TaskState::Intake, "human", "resume").unwrap();
        assert_eq!(t.state(), TaskState::Intake);
    }

    #[test]
    fn context_package_rejects_mustread_mustnotmodify_overlap() {
        let pkg = ContextPackage {
            id: "p1".into(),
            project_type: ProjectType::Feature,
            prepared_by: "preparation".into(),
            task: TaskDescription::default(),
            architecture: Architecture::default(),
            code_context: CodeContext {
                must_read: vec!["a.rs".into()],
                must_not_modify: vec!["a.rs".into()],
                related_examples: vec![],
            },
            patterns: Patterns::default(),
            constraints: Constraints::default(),
            risks: vec![],
            history: HistoricalContext::default(),
            human_sync: HumanSync::default(),
        };
        let dir = std::env::temp_dir();
        assert!(pkg.validate(&dir).is_err());
    }

    #[test]
    fn context_package_rejects_empty_must_read_and_examples() {
        let pkg = ContextPackage {
            id: "p1".into(),
            project_type: ProjectType::Feature,
            prepared_by: "preparation".into(),
            task: TaskDescription::default(),
            architecture: Architecture::default(),
            code_context: CodeContext::default(),
            patterns: Patterns::default(),
            constraints: Constraints::default(),
            risks: vec![],
            history: HistoricalContext::default(),
            human_sync: HumanSync::default(),
        };
        let dir = std::env::temp_dir();
        assert!(pkg.validate(&dir).is_err());
    }

    #[test]
    fn dedupe_paths_preserves_order() {
        let mut pkg = ContextPackage {
            id: "p1".into(),
            project_type: ProjectType::Feature,
            prepared_by: "preparation".into(),
            task: TaskDescription::default(),
            architecture: Architecture::default(),
            code_context: CodeContext {
                must_read: vec!["a.rs".into(), "b.rs".into(), "a.rs".into()],
                must_not_modify: vec![],
                related_examples: vec![],
            },
            patterns: Patterns::default(),
            constraints: Constraints::default(),
            risks: vec![],
            history: HistoricalContext::default(),
            human_sync: HumanSync::default(),
        };
        pkg.dedupe_paths();
        assert_eq!(pkg.code_context.must_read, vec!["a.rs", "b.rs"]);
    }
}
