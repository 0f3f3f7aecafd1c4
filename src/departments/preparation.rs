// src/departments/preparation.rs
// C9: Preparation Foreman — turns a classified task into a validated
// ContextPackage through architectural discovery, pattern synthesis, risk
// assessment, and learning retrieval.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::ignore::should_skip;
use crate::error::{ForgeError, Result};
use crate::llm::TierRouter;
use crate::patterns::PatternTracker;
use crate::persistence::{ContextStore, ContextType};
use crate::task::{
    Architecture, Classification, CodeContext, Constraints, ContextPackage, HistoricalContext,
    HumanSync, Patterns as PackagePatterns, Priority, ProjectType, Scope, Task, TaskDescription,
    TaskState,
};
use crate::tools;
use crate::workers::{self, constraint_identifier, dependency_mapper, file_discovery, pattern_extraction};

const MAX_RELEVANT_FILES: usize = 25;
const MAX_RELATED_EXAMPLES: usize = 10;

/// Orthogonal to `ProjectType`: what kind of artifact this request mostly
/// touches, used to tailor acceptance criteria and quality constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Documentation,
    Testing,
    Configuration,
    Code,
}

fn infer_task_kind(raw_request: &str) -> TaskKind {
    let lower = raw_request.to_lowercase();
    if lower.contains("readme")
        || lower.contains("changelog")
        || lower.contains("documentation")
        || lower.contains("docs/")
        || lower.contains("doc comment")
    {
        TaskKind::Documentation
    } else if lower.contains("test") || lower.contains("spec.") || lower.contains("coverage") {
        TaskKind::Testing
    } else if lower.contains("config")
        || lower.contains(".toml")
        || lower.contains(".yaml")
        || lower.contains(".yml")
        || lower.contains("env var")
        || lower.contains("ci pipeline")
    {
        TaskKind::Configuration
    } else {
        TaskKind::Code
    }
}

/// Tokenize a free-text request into lowercase alphanumeric keywords of
/// length >= 3, dropping a small stopword list.
fn extract_keywords(raw_request: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "and", "for", "with", "that", "this", "from", "into", "when", "what", "should",
        "would", "could", "have", "has", "are", "was", "were", "add", "new",
    ];
    static KEYWORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid regex"));
    let re = &*KEYWORD_RE;
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for token in re.find_iter(raw_request) {
        let word = token.as_str().to_lowercase();
        if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if seen.insert(word.clone()) {
            out.push(word);
        }
    }
    out
}

#[derive(Debug, Clone)]
struct Candidate {
    path: String,
    reason: String,
    priority: Priority,
}

fn promote(current: Priority, new: Priority) -> Priority {
    use Priority::*;
    match (current, new) {
        (High, _) | (_, High) => High,
        (Medium, _) | (_, Medium) => Medium,
        _ => Low,
    }
}

/// S0: paths the raw request names explicitly (e.g. "in src/foo.rs").
fn strategy_explicit_references(root: &Path, raw_request: &str) -> Vec<Candidate> {
    static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[A-Za-z0-9_\-./]+\.[A-Za-z0-9]{1,8}").expect("valid regex")
    });
    let re = &*REFERENCE_RE;
    let mut out = Vec::new();
    for m in re.find_iter(raw_request) {
        let candidate_path = m.as_str().trim_matches(|c: char| c == '.' || c == '/');
        if root.join(candidate_path).is_file() {
            out.push(Candidate {
                path: candidate_path.to_string(),
                reason: "explicitly named in the request".to_string(),
                priority: Priority::High,
            });
        }
    }
    out
}

/// S1: conventional entry points for the classified project type (e.g. a
/// bugfix task pulls in test directories; a feature task pulls in common
/// entry modules).
fn strategy_task_type_files(root: &Path, project_type: ProjectType) -> Vec<Candidate> {
    let patterns: &[&str] = match project_type {
        ProjectType::Bugfix => &["**/tests/**", "**/*test*", "**/*spec*"],
        ProjectType::Feature | ProjectType::Greenfield => &["**/main.*", "**/lib.*", "**/index.*", "**/mod.rs"],
        ProjectType::Refactor => &["**/mod.rs", "**/index.*"],
        ProjectType::Research => &[],
    };
    let mut out = Vec::new();
    for pattern in patterns {
        let result = tools::glob(root, pattern);
        if !result.success {
            continue;
        }
        for line in result.output.lines() {
            if line.starts_with("...") || line.is_empty() {
                continue;
            }
            out.push(Candidate {
                path: line.to_string(),
                reason: format!("conventional entry point for {project_type} tasks"),
                priority: Priority::Medium,
            });
        }
    }
    out
}

/// S2: file paths that contain one of the request's keywords.
fn strategy_path_match(root: &Path, keywords: &[String]) -> Vec<Candidate> {
    let all = tools::glob(root, "**/*");
    if !all.success {
        return Vec::new();
    }
    let mut out = Vec::new();
    for line in all.output.lines() {
        if line.starts_with("...") || line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();
        if let Some(kw) = keywords.iter().find(|k| lower.contains(k.as_str())) {
            out.push(Candidate {
                path: line.to_string(),
                reason: format!("path matches keyword '{kw}'"),
                priority: Priority::Medium,
            });
        }
    }
    out
}

/// S3: file contents that mention one of the request's keywords.
fn strategy_content_match(root: &Path, keywords: &[String]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for kw in keywords.iter().take(8) {
        let pattern = regex::escape(kw);
        let result = tools::grep(root, &pattern, None);
        if !result.success {
            continue;
        }
        for line in result.output.lines() {
            if line.starts_with("...") || line.is_empty() {
                continue;
            }
            if let Some(path) = line.split(':').next() {
                out.push(Candidate {
                    path: path.to_string(),
                    reason: format!("content mentions keyword '{kw}'"),
                    priority: Priority::Low,
                });
            }
        }
    }
    out
}

/// Merge candidates from all strategies, promoting priority on repeat
/// sightings and capping the final list.
fn merge_candidates(strategy_results: Vec<Vec<Candidate>>, cap: usize) -> Vec<Candidate> {
    let mut by_path: HashMap<String, Candidate> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for results in strategy_results {
        for c in results {
            match by_path.get_mut(&c.path) {
                Some(existing) => {
                    existing.priority = promote(existing.priority, c.priority);
                }
                None => {
                    order.push(c.path.clone());
                    by_path.insert(c.path.clone(), c);
                }
            }
        }
    }
    order
        .into_iter()
        .filter_map(|p| by_path.remove(&p))
        .take(cap)
        .collect()
}

/// Post-filter (spec §4.9 phase 2): drop directories, `dist/` paths, and
/// non-code extensions from the merged candidate list, unless the file was
/// promoted by an explicit reference (High priority).
fn filter_non_code_candidates(project_root: &Path, candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| {
            if c.priority == Priority::High {
                return true;
            }
            if project_root.join(&c.path).is_dir() {
                return false;
            }
            if c.path.split('/').any(|seg| seg == "dist") {
                return false;
            }
            tools::has_code_extension(&c.path)
        })
        .collect()
}

/// Counts files per top-level directory under `project_root`, skipping the
/// same VCS/build-output directories the tool executor prunes. Sorted
/// descending by count, capped to the 8 largest for a readable overview.
fn count_files_per_top_level_dir(project_root: &Path) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for entry in WalkDir::new(project_root)
        .into_iter()
        .filter_entry(|e| {
            e.path() == project_root
                || e.file_name().to_str().map(|n| !should_skip(n)).unwrap_or(true)
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(project_root).unwrap_or(entry.path());
        if let Some(top) = rel.components().next() {
            *counts.entry(top.as_os_str().to_string_lossy().to_string()).or_insert(0) += 1;
        }
    }
    let mut counted: Vec<(String, usize)> = counts.into_iter().collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counted.truncate(8);
    counted
}

/// C9: assembles the immutable `ContextPackage` an Execution Foreman will
/// act on.
pub struct PreparationForeman {
    router: Arc<TierRouter>,
    patterns: Arc<PatternTracker>,
    store: Arc<dyn ContextStore>,
}

impl PreparationForeman {
    pub fn new(router: Arc<TierRouter>, patterns: Arc<PatternTracker>, store: Arc<dyn ContextStore>) -> Self {
        Self { router, patterns, store }
    }

    pub async fn prepare(&self, task: &mut Task) -> Result<()> {
        let classification = task
            .classification
            .clone()
            .ok_or_else(|| ForgeError::InputError("task has no classification".into()))?;

        task.transition(TaskState::Preparing, "preparation_foreman", "beginning preparation")?;

        let project_root = PathBuf::from(&task.project_root);
        let keywords = extract_keywords(&task.raw_request);

        let candidates = self.discover_files(&project_root, task, &classification, &keywords).await;
        let code_context = self.assemble_code_context(&project_root, &candidates);

        let architecture = self
            .build_architecture(&project_root, task, &classification, &code_context)
            .await;
        let patterns = self
            .synthesize_patterns(&project_root, task, &code_context, &keywords)
            .await;
        let risks = self.assess_risks(&classification, &code_context);
        let history = self.retrieve_learnings(task).await;
        let task_description = self.build_task_description(task, &classification);
        let constraints = self.build_constraints(&project_root, task, &classification).await;

        let package = ContextPackage {
            id: uuid::Uuid::new_v4().to_string(),
            project_type: classification.project_type,
            prepared_by: "preparation_foreman".to_string(),
            task: task_description,
            architecture,
            code_context,
            patterns,
            constraints,
            risks,
            history,
            human_sync: HumanSync::default(),
        };

        let mut package = package;
        package.dedupe_paths();

        match package.validate(&project_root) {
            Ok(()) => {
                task.context_package = Some(package);
                task.transition(TaskState::Prepared, "preparation_foreman", "context package validated")?;
                self.record_decision(task, "context package prepared and validated").await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "context package failed validation");
                task.transition(TaskState::Failed, "preparation_foreman", e.to_string())?;
                self.record_decision(task, &format!("context package validation failed: {e}")).await;
                Err(e)
            }
        }
    }

    /// Phase 2: architectural discovery. Runs the deterministic S0-S3
    /// strategies and, when a judgment-tier client is configured, folds in
    /// the FileDiscovery worker's exploration results.
    async fn discover_files(
        &self,
        project_root: &Path,
        task: &Task,
        classification: &Classification,
        keywords: &[String],
    ) -> Vec<Candidate> {
        let mut strategy_results = vec![
            strategy_explicit_references(project_root, &task.raw_request),
            strategy_task_type_files(project_root, classification.project_type),
            strategy_path_match(project_root, keywords),
            strategy_content_match(project_root, keywords),
        ];

        let worker_spec = file_discovery::spec(file_discovery::default_system_prompt());
        let prompt = file_discovery::build_user_prompt(
            &task.raw_request,
            keywords,
            &classification.project_type.to_string(),
        );
        let outcome = workers::execute(&self.router, project_root, &worker_spec, prompt).await;
        if outcome.success {
            if let Some(result) = outcome.result {
                if let Ok(parsed) = serde_json::from_value::<file_discovery::FileDiscoveryResult>(result) {
                    let worker_candidates = parsed
                        .relevant_files
                        .into_iter()
                        .map(|f| Candidate {
                            path: f.path,
                            reason: f.reason,
                            priority: f.priority,
                        })
                        .collect();
                    strategy_results.push(worker_candidates);
                }
            }
        } else if let Some(error) = &outcome.error {
            info!(error, "file discovery worker unavailable, relying on deterministic strategies");
        }

        let merged = merge_candidates(strategy_results, MAX_RELEVANT_FILES);
        filter_non_code_candidates(project_root, merged)
    }

    /// Phase 3: split discovered candidates into mustRead / relatedExamples,
    /// and derive mustNotModify from common do-not-touch conventions.
    fn assemble_code_context(&self, project_root: &Path, candidates: &[Candidate]) -> CodeContext {
        let mut must_read = Vec::new();
        let mut related_examples = Vec::new();

        for c in candidates {
            match c.priority {
                Priority::High | Priority::Medium => must_read.push(c.path.clone()),
                Priority::Low => {
                    if related_examples.len() < MAX_RELATED_EXAMPLES {
                        related_examples.push(c.path.clone());
                    }
                }
            }
        }

        let must_not_modify = self.find_protected_paths(project_root);

        CodeContext {
            must_read,
            must_not_modify,
            related_examples,
        }
    }

    /// Generated/vendored paths an execution foreman must never edit.
    fn find_protected_paths(&self, project_root: &Path) -> Vec<String> {
        const PROTECTED_GLOBS: &[&str] = &["**/Cargo.lock", "**/package-lock.json", "**/*.generated.*"];
        let mut out = Vec::new();
        for pattern in PROTECTED_GLOBS {
            let result = tools::glob(project_root, pattern);
            if result.success {
                out.extend(result.output.lines().filter(|l| !l.is_empty() && !l.starts_with("...")).map(String::from));
            }
        }
        out
    }

    /// Phase 3: architecture/dependency worker — counts files per top-level
    /// directory and maps the dependencies/entry points/cycles touched by
    /// this request.
    async fn build_architecture(
        &self,
        project_root: &Path,
        task: &Task,
        classification: &Classification,
        code_context: &CodeContext,
    ) -> Architecture {
        let dir_counts = count_files_per_top_level_dir(project_root);

        let worker_spec = dependency_mapper::spec(dependency_mapper::default_system_prompt());
        let prompt = dependency_mapper::build_user_prompt(&task.raw_request, &code_context.must_read);
        let outcome = workers::execute(&self.router, project_root, &worker_spec, prompt).await;

        let mut dependencies = Vec::new();
        if outcome.success {
            if let Some(result) = outcome.result {
                match serde_json::from_value::<dependency_mapper::DependencyMapperResult>(result) {
                    Ok(parsed) => {
                        dependencies.extend(
                            parsed
                                .dependencies
                                .iter()
                                .map(|d| format!("{} -> {} ({})", d.from, d.to, d.dep_type.label())),
                        );
                        dependencies.extend(parsed.external_dependencies.iter().map(|e| {
                            format!("external: {}{}", e.name, if e.is_dev { " (dev)" } else { "" })
                        }));
                        dependencies.extend(
                            parsed
                                .entry_points
                                .iter()
                                .map(|ep| format!("entry point: {} ({})", ep.path, ep.entry_type)),
                        );
                        dependencies.extend(parsed.circular_dependencies.iter().map(|cyc| {
                            format!("circular dependency ({}): {}", cyc.severity.label(), cyc.cycle.join(" -> "))
                        }));
                    }
                    Err(e) => warn!(error = %e, "dependency mapper result failed to parse"),
                }
            }
        } else if let Some(error) = &outcome.error {
            info!(error, "dependency mapper worker unavailable, architecture left to directory heuristics");
        }

        let overview = if dir_counts.is_empty() {
            format!(
                "{} change, scope {:?}, touching {} candidate file(s).",
                classification.project_type,
                classification.scope,
                code_context.must_read.len()
            )
        } else {
            format!(
                "{} change, scope {:?}, touching {} candidate file(s) across top-level directories: {}.",
                classification.project_type,
                classification.scope,
                code_context.must_read.len(),
                dir_counts
                    .iter()
                    .map(|(dir, count)| format!("{dir} ({count})"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };

        Architecture {
            overview,
            relevant_components: code_context.must_read.clone(),
            dependencies,
        }
    }

    /// Phase 4: recommended patterns, scoped to this request's keywords as a
    /// context tag, plus naming/testing conventions surfaced by the pattern
    /// extraction worker.
    async fn synthesize_patterns(
        &self,
        project_root: &Path,
        task: &Task,
        code_context: &CodeContext,
        keywords: &[String],
    ) -> PackagePatterns {
        let context_tag = keywords.first().cloned().unwrap_or_default();
        let recommended = match self.patterns.get_recommended_patterns(&context_tag, 5).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "pattern tracker unavailable during preparation");
                Vec::new()
            }
        };
        let mut code_style: Vec<String> = recommended.into_iter().map(|p| p.name).collect();

        let worker_spec = pattern_extraction::spec(pattern_extraction::default_system_prompt());
        let prompt = pattern_extraction::build_user_prompt(&task.raw_request, &code_context.must_read);
        let outcome = workers::execute(&self.router, project_root, &worker_spec, prompt).await;

        let mut naming = None;
        let mut file_organization = None;
        let mut testing = None;
        let mut error_handling = None;

        if outcome.success {
            if let Some(result) = outcome.result {
                match serde_json::from_value::<pattern_extraction::PatternExtractionResult>(result) {
                    Ok(parsed) => {
                        naming = parsed.conventions.naming;
                        file_organization = parsed.conventions.file_organization;
                        testing = parsed.conventions.testing;
                        error_handling = parsed.conventions.error_handling;
                        code_style.extend(parsed.patterns);
                        code_style.extend(parsed.anti_patterns.into_iter().map(|p| format!("avoid: {p}")));
                    }
                    Err(e) => warn!(error = %e, "pattern extraction result failed to parse"),
                }
            }
        } else if let Some(error) = &outcome.error {
            info!(error, "pattern extraction worker unavailable, conventions left to the pattern tracker");
        }

        if code_context.must_read.is_empty() {
            code_style.push("no existing files matched; treat this as net-new scaffolding".to_string());
        }

        PackagePatterns {
            naming,
            file_organization,
            testing,
            error_handling,
            code_style,
        }
    }

    /// Phase 5: cheap heuristics flagging likely blast radius and ambiguity.
    fn assess_risks(&self, classification: &Classification, code_context: &CodeContext) -> Vec<String> {
        let mut risks = Vec::new();
        if classification.scope == Scope::Large {
            risks.push("large scope: consider splitting into smaller follow-up tasks".to_string());
        }
        if classification.confidence < 0.7 {
            risks.push(format!(
                "classification confidence is only {:.2}; verify the inferred project type",
                classification.confidence
            ));
        }
        if !code_context.must_not_modify.is_empty() {
            risks.push("protected files (lockfiles/generated code) detected in project, excluded from edits".to_string());
        }
        if code_context.must_read.is_empty() && !code_context.related_examples.is_empty() {
            risks.push("no direct file matches found; only loosely related examples available".to_string());
        }
        risks
    }

    /// Phase 6: prior decisions/completions relevant to this request, pulled
    /// from the shared context store.
    async fn retrieve_learnings(&self, task: &Task) -> HistoricalContext {
        let mut history = HistoricalContext::default();
        let query = task.raw_request.split_whitespace().take(6).collect::<Vec<_>>().join(" ");
        match self.store.search_context(&query).await {
            Ok(records) => {
                for record in records.into_iter().take(5) {
                    match record.context_type {
                        ContextType::Decision => history.related_decisions.push(record.content),
                        ContextType::Completion | ContextType::Error => {
                            history.previous_attempts.push(record.content)
                        }
                        ContextType::Planning => {}
                    }
                }
            }
            Err(e) => warn!(error = %e, "learning retrieval failed"),
        }
        history
    }

    /// Phase 7: task-type-aware acceptance criteria, tailored to whether the
    /// request is mostly documentation, testing, configuration, or code.
    fn build_task_description(&self, task: &Task, classification: &Classification) -> TaskDescription {
        let kind = infer_task_kind(&task.raw_request);
        let mut acceptance_criteria = vec![format!(
            "The change satisfies the request: \"{}\"",
            task.raw_request
        )];
        match kind {
            TaskKind::Documentation => {
                acceptance_criteria.push("Updated docs accurately describe current behavior".to_string());
                acceptance_criteria.push("No code files are modified unless explicitly requested".to_string());
            }
            TaskKind::Testing => {
                acceptance_criteria.push("New or updated tests exercise the described behavior".to_string());
                acceptance_criteria.push("The test suite passes after the change".to_string());
            }
            TaskKind::Configuration => {
                acceptance_criteria.push("Configuration changes are backward compatible or explicitly migrated".to_string());
                acceptance_criteria.push("The project still builds/starts with the new configuration".to_string());
            }
            TaskKind::Code => {
                acceptance_criteria.push("The project compiles after the change".to_string());
                if classification.project_type == ProjectType::Bugfix {
                    acceptance_criteria.push("The reported defect no longer reproduces".to_string());
                }
            }
        }

        TaskDescription {
            description: task.raw_request.clone(),
            acceptance_criteria,
            scope_in: Vec::new(),
            scope_out: Vec::new(),
        }
    }

    /// Derives the hard technical constraints (type/lint/build/api checks,
    /// plus the ESM/Node-resolution derived import-style rule) via the
    /// constraint identifier worker, combined with the kind-based quality
    /// heuristics below.
    async fn build_constraints(&self, project_root: &Path, task: &Task, classification: &Classification) -> Constraints {
        let kind = infer_task_kind(&task.raw_request);
        let mut quality = Vec::new();
        match kind {
            TaskKind::Documentation => quality.push("prose only, no behavioral code changes".to_string()),
            TaskKind::Testing => quality.push("tests must be deterministic and not rely on network access".to_string()),
            TaskKind::Configuration => quality.push("no secrets committed to configuration files".to_string()),
            TaskKind::Code => quality.push("match the existing module's error handling and logging conventions".to_string()),
        }
        if classification.scope == Scope::Large {
            quality.push("prefer incremental, reviewable edits over one large rewrite".to_string());
        }

        let mut technical = Vec::new();
        let worker_spec = constraint_identifier::spec(constraint_identifier::default_system_prompt());
        let prompt = constraint_identifier::build_user_prompt(&task.raw_request);
        let outcome = workers::execute(&self.router, project_root, &worker_spec, prompt).await;

        if outcome.success {
            if let Some(result) = outcome.result {
                match serde_json::from_value::<constraint_identifier::ConstraintIdentifierResult>(result) {
                    Ok(parsed) => {
                        technical.extend(parsed.type_constraints);
                        technical.extend(parsed.build_constraints);
                        technical.extend(parsed.api_constraints);
                        technical.extend(parsed.lint_constraints);
                        quality.extend(parsed.test_constraints);
                    }
                    Err(e) => warn!(error = %e, "constraint identifier result failed to parse"),
                }
            }
        } else if let Some(error) = &outcome.error {
            info!(error, "constraint identifier worker unavailable, relying on heuristics");
        }

        if let Ok(tsconfig) = std::fs::read_to_string(project_root.join("tsconfig.json")) {
            technical.extend(constraint_identifier::derive_module_constraints(&tsconfig));
        }

        Constraints {
            technical,
            quality,
            timeline: None,
        }
    }

    async fn record_decision(&self, task: &Task, note: &str) {
        if let Err(e) = self
            .store
            .store_context(note, ContextType::Planning, &["preparation".to_string(), task.id.clone()])
            .await
        {
            warn!(error = %e, "failed to record preparation decision");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteContextStore;
    use crate::task::{Department, ProjectType, Scope};
    use tempfile::TempDir;

    fn setup_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/login.rs"), "fn login() {}\n").unwrap();
        dir
    }

    async fn foreman() -> PreparationForeman {
        let store = Arc::new(SqliteContextStore::open_in_memory().await.unwrap());
        let router = Arc::new(TierRouter::new(HashMap::new()));
        let patterns = Arc::new(PatternTracker::new(store.clone()));
        PreparationForeman::new(router, patterns, store)
    }

    #[test]
    fn keyword_extraction_drops_stopwords_and_short_tokens() {
        let kws = extract_keywords("Fix the login bug when a user signs in");
        assert!(kws.contains(&"login".to_string()));
        assert!(kws.contains(&"user".to_string()));
        assert!(!kws.contains(&"the".to_string()));
    }

    #[test]
    fn infers_documentation_task_kind() {
        assert_eq!(infer_task_kind("update the README with new usage docs"), TaskKind::Documentation);
    }

    #[test]
    fn infers_testing_task_kind() {
        assert_eq!(infer_task_kind("add a test for the login flow"), TaskKind::Testing);
    }

    #[test]
    fn explicit_reference_strategy_finds_named_file() {
        let dir = setup_project();
        let cands = strategy_explicit_references(dir.path(), "please update src/login.rs to log failures");
        assert!(cands.iter().any(|c| c.path == "src/login.rs"));
    }

    #[test]
    fn merge_candidates_promotes_priority_on_overlap() {
        let a = vec![Candidate { path: "x.rs".into(), reason: "a".into(), priority: Priority::Low }];
        let b = vec![Candidate { path: "x.rs".into(), reason: "b".into(), priority: Priority::High }];
        let merged = merge_candidates(vec![a, b], 10);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].priority, Priority::High);
    }

    #[test]
    fn non_code_candidate_filtered_unless_explicit_reference() {
        let dir = setup_project();
        std::fs::write(dir.path().join("logo.png"), b"\x89PNG").unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/bundle.js"), "// built").unwrap();

        let candidates = vec![
            Candidate { path: "logo.png".into(), reason: "keyword match".into(), priority: Priority::Medium },
            Candidate { path: "dist/bundle.js".into(), reason: "keyword match".into(), priority: Priority::Medium },
            Candidate { path: "src/login.rs".into(), reason: "keyword match".into(), priority: Priority::Medium },
            Candidate { path: "logo.png".into(), reason: "explicitly named".into(), priority: Priority::High },
        ];
        let filtered = filter_non_code_candidates(dir.path(), candidates);

        assert!(filtered.iter().any(|c| c.path == "src/login.rs"));
        assert!(!filtered.iter().any(|c| c.path == "dist/bundle.js"));
        assert_eq!(filtered.iter().filter(|c| c.path == "logo.png").count(), 1);
        assert_eq!(filtered.iter().find(|c| c.path == "logo.png").unwrap().priority, Priority::High);
    }

    #[tokio::test]
    async fn prepare_produces_validated_package() {
        let dir = setup_project();
        let f = foreman().await;
        let mut task = Task::new("fix login.rs so it logs failed attempts", dir.path().to_string_lossy().to_string());
        task.classification = Some(Classification {
            project_type: ProjectType::Bugfix,
            scope: Scope::Small,
            department: Department::Preparation,
            confidence: 0.9,
        });
        task.transition(TaskState::Classified, "test", "seed").unwrap();

        f.prepare(&mut task).await.unwrap();
        assert_eq!(task.state(), TaskState::Prepared);
        assert!(task.context_package.is_some());
    }
}
