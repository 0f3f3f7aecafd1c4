// src/departments/plant_manager.rs
// C8: Plant Manager — intake classification, department routing, escalation
// handling, and task resumption.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::persistence::{ContextStore, ContextType};
use crate::task::{Classification, Department, ProjectType, Scope, Task, TaskState};

/// Below this confidence the task is routed to human sync instead of being
/// auto-classified.
pub const CLASSIFICATION_CONFIDENCE_FLOOR: f64 = 0.5;

struct Keyword {
    word: &'static str,
    project_type: ProjectType,
    weight: f64,
}

const KEYWORDS: &[Keyword] = &[
    Keyword { word: "fix", project_type: ProjectType::Bugfix, weight: 1.0 },
    Keyword { word: "bug", project_type: ProjectType::Bugfix, weight: 1.0 },
    Keyword { word: "broken", project_type: ProjectType::Bugfix, weight: 0.8 },
    Keyword { word: "crash", project_type: ProjectType::Bugfix, weight: 0.9 },
    Keyword { word: "error", project_type: ProjectType::Bugfix, weight: 0.6 },
    Keyword { word: "regression", project_type: ProjectType::Bugfix, weight: 0.8 },
    Keyword { word: "add", project_type: ProjectType::Feature, weight: 0.8 },
    Keyword { word: "implement", project_type: ProjectType::Feature, weight: 1.0 },
    Keyword { word: "support", project_type: ProjectType::Feature, weight: 0.5 },
    Keyword { word: "feature", project_type: ProjectType::Feature, weight: 1.0 },
    Keyword { word: "new", project_type: ProjectType::Feature, weight: 0.4 },
    Keyword { word: "scaffold", project_type: ProjectType::Greenfield, weight: 1.0 },
    Keyword { word: "bootstrap", project_type: ProjectType::Greenfield, weight: 1.0 },
    Keyword { word: "from scratch", project_type: ProjectType::Greenfield, weight: 1.0 },
    Keyword { word: "new project", project_type: ProjectType::Greenfield, weight: 1.0 },
    Keyword { word: "refactor", project_type: ProjectType::Refactor, weight: 1.0 },
    Keyword { word: "rename", project_type: ProjectType::Refactor, weight: 0.7 },
    Keyword { word: "clean up", project_type: ProjectType::Refactor, weight: 0.7 },
    Keyword { word: "reorganize", project_type: ProjectType::Refactor, weight: 0.8 },
    Keyword { word: "extract", project_type: ProjectType::Refactor, weight: 0.6 },
    Keyword { word: "research", project_type: ProjectType::Research, weight: 1.0 },
    Keyword { word: "investigate", project_type: ProjectType::Research, weight: 0.9 },
    Keyword { word: "evaluate", project_type: ProjectType::Research, weight: 0.8 },
    Keyword { word: "compare", project_type: ProjectType::Research, weight: 0.6 },
    Keyword { word: "should we", project_type: ProjectType::Research, weight: 0.8 },
];

const SMALL_MARKERS: &[&str] = &["typo", "rename", "small", "quick", "one-line", "tiny"];
const LARGE_MARKERS: &[&str] = &["migrate", "rewrite", "overhaul", "across the codebase", "entire"];

/// Keyword-scored classification over a closed vocabulary. Confidence is the
/// winning project type's share of total matched weight; ties favor the
/// first-registered keyword for that type.
fn classify_request(raw_request: &str) -> Classification {
    let lower = raw_request.to_lowercase();
    let mut scores: [f64; 5] = [0.0; 5];
    let type_index = |t: ProjectType| -> usize {
        match t {
            ProjectType::Feature => 0,
            ProjectType::Bugfix => 1,
            ProjectType::Greenfield => 2,
            ProjectType::Refactor => 3,
            ProjectType::Research => 4,
        }
    };

    let mut total_weight = 0.0;
    for kw in KEYWORDS {
        if lower.contains(kw.word) {
            scores[type_index(kw.project_type)] += kw.weight;
            total_weight += kw.weight;
        }
    }

    let (best_index, best_score) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, s)| (i, *s))
        .unwrap_or((0, 0.0));

    let project_type = match best_index {
        0 => ProjectType::Feature,
        1 => ProjectType::Bugfix,
        2 => ProjectType::Greenfield,
        3 => ProjectType::Refactor,
        _ => ProjectType::Research,
    };

    let confidence = if total_weight > 0.0 {
        (best_score / total_weight).min(1.0)
    } else {
        0.0
    };

    let scope = if LARGE_MARKERS.iter().any(|m| lower.contains(m)) {
        Scope::Large
    } else if SMALL_MARKERS.iter().any(|m| lower.contains(m)) {
        Scope::Small
    } else {
        Scope::Medium
    };

    let department = match project_type {
        ProjectType::Research | ProjectType::Greenfield => Department::RAndD,
        _ => Department::Preparation,
    };

    Classification {
        project_type,
        scope,
        department,
        confidence,
    }
}

/// C8: front door of the pipeline. Classifies intake, routes to a
/// department, and handles escalation/resumption bookkeeping.
pub struct PlantManager {
    store: Arc<dyn ContextStore>,
}

impl PlantManager {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    /// Classify a freshly-created task and transition it to `Classified`, or
    /// to `Blocked` (human sync required) when confidence is too low.
    pub async fn intake(&self, task: &mut Task) -> Result<Classification> {
        let classification = classify_request(&task.raw_request);
        info!(
            project_type = %classification.project_type,
            scope = %classification.scope,
            department = %classification.department,
            confidence = classification.confidence,
            "classified task intake"
        );

        task.classification = Some(classification.clone());

        if classification.confidence < CLASSIFICATION_CONFIDENCE_FLOOR {
            warn!(confidence = classification.confidence, "low classification confidence, routing to human sync");
            task.transition(
                TaskState::Blocked,
                "plant_manager",
                format!(
                    "classification confidence {:.2} below floor {CLASSIFICATION_CONFIDENCE_FLOOR}",
                    classification.confidence
                ),
            )?;
            self.record_decision(task, "low-confidence classification escalated to human sync")
                .await?;
            return Ok(classification);
        }

        task.transition(
            TaskState::Classified,
            "plant_manager",
            format!("classified as {:?}/{:?}", classification.project_type, classification.scope),
        )?;
        Ok(classification)
    }

    /// Record an escalation against a task, moving it to `Blocked` with a
    /// human-facing reason and suggested next steps.
    pub async fn handle_escalation(
        &self,
        task: &mut Task,
        from: &str,
        reason: impl Into<String>,
        suggested_options: Vec<String>,
    ) -> Result<()> {
        let reason = reason.into();
        task.escalation = Some(crate::task::Escalation {
            from: from.to_string(),
            reason: reason.clone(),
            suggested_options,
            timestamp: chrono::Utc::now(),
        });
        if task.state() != TaskState::Blocked {
            task.transition(TaskState::Blocked, "plant_manager", reason.clone())?;
        }
        self.record_decision(task, &format!("escalation from {from}: {reason}"))
            .await?;
        Ok(())
    }

    /// Resume a blocked task back into the pipeline at `Intake` for
    /// re-classification, carrying forward the escalation as history.
    pub fn resume_task(&self, task: &mut Task, actor_id: &str) -> Result<()> {
        task.transition(TaskState::Intake, actor_id, "resumed after human sync")?;
        task.escalation = None;
        Ok(())
    }

    async fn record_decision(&self, task: &Task, note: &str) -> Result<()> {
        self.store
            .store_context(
                note,
                ContextType::Decision,
                &["plant_manager".to_string(), task.id.clone()],
            )
            .await?;
        Ok(())
    }
}
