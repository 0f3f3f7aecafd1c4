// src/departments/quality_gate.rs
// C12: Quality Gate — the last stop before a task leaves the pipeline.
// Required checks gate approval outright; advisory checks only ever
// downgrade an approval to human review, never block it on their own.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::warn;

use crate::error::Result;
use crate::persistence::{ContextStore, ContextType};
use crate::task::{QualityRecommendation, QualityResult, Task, TaskState};

const ADVISORY_MARKERS: &[&str] = &["TODO", "FIXME", ": any"];

/// C12: reviews an executed task's result and recommends
/// approve/human-review/reject, then transitions the task out of
/// `Reviewing`.
pub struct QualityGate {
    store: Arc<dyn ContextStore>,
}

impl QualityGate {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    pub async fn review(&self, task: &mut Task) -> Result<()> {
        let execution = task
            .execution_result
            .clone()
            .ok_or_else(|| crate::error::ForgeError::InputError("task has no execution result to review".into()))?;
        let package = task.context_package.clone();
        let project_root = std::path::PathBuf::from(&task.project_root);

        let mut notes = Vec::new();
        let mut required_passed = true;

        if !execution.compilation_passed {
            required_passed = false;
            notes.push("compilation did not pass".to_string());
        }

        let touched: Vec<&String> = execution.files_created.iter().chain(execution.files_modified.iter()).collect();
        let missing: Vec<&&String> = touched.iter().filter(|p| !project_root.join(p).is_file()).collect();
        if !missing.is_empty() {
            required_passed = false;
            notes.push(format!(
                "files missing from disk at review time: {}",
                missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }

        if let Some(validation) = &execution.validation_summary {
            if !validation.overall_passed {
                required_passed = false;
                notes.push(format!(
                    "validation summary failed ({}/{} tools passed)",
                    validation.passed, validation.total_tools
                ));
            }
        }

        let mut advisory_passed = true;

        if let Some(package) = &package {
            let unmet = self.acceptance_criteria_heuristic(&project_root, &touched, &package.task.acceptance_criteria);
            if !unmet.is_empty() {
                advisory_passed = false;
                notes.push(format!("acceptance criteria not obviously satisfied: {}", unmet.join("; ")));
            }
        }

        let marker_hits = self.pattern_compliance_scan(&project_root, &touched);
        if !marker_hits.is_empty() {
            advisory_passed = false;
            notes.push(format!("pattern compliance markers found: {}", marker_hits.join(", ")));
        }

        let recommendation = if !required_passed {
            QualityRecommendation::Reject
        } else if !advisory_passed {
            QualityRecommendation::HumanReview
        } else {
            QualityRecommendation::Approve
        };

        let result = QualityResult {
            recommendation,
            required_passed,
            advisory_passed,
            notes,
        };

        let note = format!(
            "quality gate recommendation: {} (required_passed={}, advisory_passed={})",
            result.recommendation, result.required_passed, result.advisory_passed
        );
        if let Err(e) = self
            .store
            .store_context(&note, ContextType::Decision, &["quality_gate".to_string(), task.id.clone()])
            .await
        {
            warn!(error = %e, "failed to persist quality gate decision");
        }

        let target_state = match recommendation {
            QualityRecommendation::Approve => TaskState::Completed,
            QualityRecommendation::HumanReview | QualityRecommendation::Reject => TaskState::Blocked,
        };
        let reason = format!("quality gate: {recommendation}");

        task.quality_result = Some(result);
        task.transition(target_state, "quality_gate", reason)?;
        Ok(())
    }

    /// Best-effort: every quoted token in an acceptance criterion should
    /// appear somewhere across the touched files.
    fn acceptance_criteria_heuristic(&self, project_root: &Path, touched: &[&String], criteria: &[String]) -> Vec<String> {
        let contents: Vec<String> = touched
            .iter()
            .filter_map(|p| std::fs::read_to_string(project_root.join(p)).ok())
            .collect();

        criteria
            .iter()
            .filter(|criterion| {
                let tokens = quoted_tokens(criterion);
                !tokens.is_empty() && !tokens.iter().all(|t| contents.iter().any(|c| c.contains(t)))
            })
            .cloned()
            .collect()
    }

    fn pattern_compliance_scan(&self, project_root: &Path, touched: &[&String]) -> Vec<String> {
        let mut hits = Vec::new();
        for path in touched {
            let Ok(content) = std::fs::read_to_string(project_root.join(path)) else {
                continue;
            };
            for marker in ADVISORY_MARKERS {
                if content.contains(marker) {
                    hits.push(format!("{path}: {marker}"));
                }
            }
        }
        hits
    }
}

static QUOTED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"`]([^'"`]+)['"`]"#).expect("valid regex"));

fn quoted_tokens(text: &str) -> Vec<String> {
    QUOTED_TOKEN_RE.captures_iter(text).map(|c| c[1].to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteContextStore;
    use crate::task::{
        Architecture, CodeContext, Constraints, ContextPackage, CostBreakdown, ExecutionResult, HistoricalContext,
        HumanSync, Patterns, ProjectType, TaskDescription,
    };
    use std::fs;
    use tempfile::TempDir;

    async fn gate() -> QualityGate {
        let store = Arc::new(SqliteContextStore::open_in_memory().await.unwrap());
        QualityGate::new(store)
    }

    fn task_at_reviewing(dir: &TempDir) -> Task {
        let mut task = Task::new("req", dir.path().to_string_lossy().to_string());
        task.transition(TaskState::Classified, "t", "t").unwrap();
        task.transition(TaskState::Preparing, "t", "t").unwrap();
        task.transition(TaskState::Prepared, "t", "t").unwrap();
        task.transition(TaskState::Executing, "t", "t").unwrap();
        task.transition(TaskState::Reviewing, "t", "t").unwrap();
        task
    }

    fn bare_package() -> ContextPackage {
        ContextPackage {
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
        }
    }

    #[tokio::test]
    async fn approves_a_clean_execution() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "pub fn greet() {}").unwrap();
        let mut task = task_at_reviewing(&dir);
        task.context_package = Some(bare_package());
        let mut result = ExecutionResult::new_empty();
        result.success = true;
        result.compilation_passed = true;
        result.files_created = vec!["a.rs".into()];
        result.cost_breakdown = CostBreakdown::default();
        task.execution_result = Some(result);

        let gate = gate().await;
        gate.review(&mut task).await.unwrap();

        let quality = task.quality_result.as_ref().unwrap();
        assert_eq!(quality.recommendation, QualityRecommendation::Approve);
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn rejects_when_compilation_failed() {
        let dir = TempDir::new().unwrap();
        let mut task = task_at_reviewing(&dir);
        let mut result = ExecutionResult::new_empty();
        result.compilation_passed = false;
        task.execution_result = Some(result);

        let gate = gate().await;
        gate.review(&mut task).await.unwrap();

        let quality = task.quality_result.as_ref().unwrap();
        assert_eq!(quality.recommendation, QualityRecommendation::Reject);
        assert_eq!(task.state(), TaskState::Blocked);
    }

    #[tokio::test]
    async fn human_review_when_advisory_marker_present() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "pub fn greet() {} // TODO: improve this").unwrap();
        let mut task = task_at_reviewing(&dir);
        let mut result = ExecutionResult::new_empty();
        result.compilation_passed = true;
        result.files_created = vec!["a.rs".into()];
        task.execution_result = Some(result);

        let gate = gate().await;
        gate.review(&mut task).await.unwrap();

        let quality = task.quality_result.as_ref().unwrap();
        assert_eq!(quality.recommendation, QualityRecommendation::HumanReview);
        assert_eq!(task.state(), TaskState::Blocked);
    }

    #[test]
    fn quoted_tokens_extracts_multiple() {
        let tokens = quoted_tokens("must define 'foo' and \"bar\"");
        assert_eq!(tokens, vec!["foo".to_string(), "bar".to_string()]);
    }
}
