// src/departments/execution.rs
// C10: Execution Foreman — the largest subsystem. Generates code changes
// against a ContextPackage, applies them to disk, checks compilation,
// self-heals on failure, hooks into validation, and assembles the
// ExecutionResult with a strict failure-phase precedence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::departments::ValidationToolBuilder;
use crate::error::{ForgeError, Result};
use crate::feedback::{ActionKind, ErrorContext, FeedbackRouter, categorize_error};
use crate::llm::{CallRequest, CallResult, Operation, Tool, TierRouter, ToolChoice};
use crate::pack::{self, PackInput};
use crate::patterns::PatternTracker;
use crate::persistence::{ContextStore, ContextType};
use crate::task::{
    ContextPackage, FailurePhase, Priority, StructuredFailure, Task, TaskState,
    ValidationSummary,
};
use crate::task::ExecutionResult;
use crate::utils::json::parse_json_hardened;

const DEFAULT_CONTEXT_BUDGET: u64 = 40_000;
const MAX_RELATED_EXAMPLES: usize = 5;
const DEFAULT_MAX_SELF_HEAL_ATTEMPTS: u32 = 2;
const TS_COMPILE_TIMEOUT_SECS: u64 = 60;
const RUST_COMPILE_TIMEOUT_SECS: u64 = 120;
const MAX_ERROR_DIAGNOSTICS: usize = 10;
const MAX_ERROR_BYTES: usize = 4 * 1024;

// --- submit_code_changes payload shapes ---------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum FileAction {
    Create,
    Modify,
    Edit,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct FileEditOp {
    search: String,
    replace: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct GeneratedFile {
    path: String,
    #[serde(default)]
    action: Option<FileAction>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    edits: Option<Vec<FileEditOp>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
struct CodeChanges {
    #[serde(default)]
    files: Vec<GeneratedFile>,
    #[serde(default)]
    #[allow(dead_code)]
    explanation: Option<String>,
}

fn submit_code_changes_tool_schema() -> Tool {
    Tool::function(
        "submit_code_changes",
        "Submit the file-level changes needed to satisfy the request.",
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["path"],
                        "properties": {
                            "path": {"type": "string"},
                            "action": {"type": "string", "enum": ["create", "modify", "edit"]},
                            "content": {"type": "string"},
                            "edits": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["search", "replace"],
                                    "properties": {
                                        "search": {"type": "string"},
                                        "replace": {"type": "string"}
                                    }
                                }
                            }
                        }
                    }
                },
                "explanation": {"type": "string"}
            },
            "required": ["files"]
        }),
    )
}

/// Defaults missing `action` to `create`; drops `edit` entries with no
/// `edits`, since there would be nothing to apply.
fn normalize_changes(mut changes: CodeChanges) -> CodeChanges {
    changes.files.retain_mut(|f| {
        let action = f.action.unwrap_or(FileAction::Create);
        f.action = Some(action);
        if action == FileAction::Edit && f.edits.as_ref().map(|e| e.is_empty()).unwrap_or(true) {
            warn!(path = %f.path, "dropping edit action with no edits[]");
            return false;
        }
        true
    });
    changes
}

fn extract_code_changes(call: &CallResult) -> Result<CodeChanges> {
    if let Some(tc) = call.tool_calls.iter().find(|t| t.function.name == "submit_code_changes") {
        let args: Value = serde_json::from_str(&tc.function.arguments)
            .map_err(|e| ForgeError::LlmError(format!("malformed submit_code_changes arguments: {e}")))?;
        let changes: CodeChanges = serde_json::from_value(args)
            .map_err(|e| ForgeError::LlmError(format!("submit_code_changes schema mismatch: {e}")))?;
        return Ok(normalize_changes(changes));
    }

    // No tool use: fall back to legacy JSON-in-text parsing.
    let text = call.text.clone().unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ForgeError::LlmError("no tool call and no text in response".into()));
    }
    match parse_json_hardened::<CodeChanges>(&text) {
        Ok(changes) => Ok(normalize_changes(changes)),
        Err(e) => Err(ForgeError::LlmError(format!(
            "no tool use and legacy JSON-in-text parsing failed: {e}"
        ))),
    }
}

// --- file operations -----------------------------------------------------

struct FileOpOutcome {
    created: Vec<String>,
    modified: Vec<String>,
    errors: Vec<String>,
}

/// Applies `files` under `project_root`. When `allowed` is `Some`, any file
/// whose path isn't in the set is dropped with a warning rather than
/// touched — the self-heal repair-mode guard.
fn apply_file_operations(
    project_root: &Path,
    files: &[GeneratedFile],
    allowed: Option<&HashSet<String>>,
) -> FileOpOutcome {
    let mut outcome = FileOpOutcome {
        created: Vec::new(),
        modified: Vec::new(),
        errors: Vec::new(),
    };

    for file in files {
        if let Some(allowed) = allowed {
            if !allowed.contains(&file.path) {
                warn!(path = %file.path, "self-heal attempted to touch an unauthorized path, dropping");
                continue;
            }
        }

        let full_path = project_root.join(&file.path);
        let action = file.action.unwrap_or(FileAction::Create);

        match action {
            FileAction::Create | FileAction::Modify => {
                let existed = full_path.is_file();
                if let Some(parent) = full_path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        outcome
                            .errors
                            .push(format!("{}: failed to create parent directories: {e}", file.path));
                        continue;
                    }
                }
                let content = file.content.clone().unwrap_or_default();
                match std::fs::write(&full_path, &content) {
                    Ok(()) => {
                        if existed {
                            outcome.modified.push(file.path.clone());
                        } else {
                            outcome.created.push(file.path.clone());
                        }
                    }
                    Err(e) => outcome.errors.push(format!("{}: write failed: {e}", file.path)),
                }
            }
            FileAction::Edit => match apply_edits(&full_path, file.edits.as_deref().unwrap_or_default()) {
                Ok(()) => outcome.modified.push(file.path.clone()),
                Err(e) => outcome.errors.push(format!("{}: {e}", file.path)),
            },
        }
    }

    outcome
}

/// Verify every `search` string exists as a literal substring in the
/// pre-write content before applying any of them, then fold-apply each to
/// the first remaining occurrence in order. No fuzzy matching — a missing
/// search string aborts the whole file with no write.
fn apply_edits(path: &Path, edits: &[FileEditOp]) -> Result<()> {
    let original = std::fs::read_to_string(path)
        .map_err(|e| ForgeError::FileOpError(format!("cannot read for edit: {e}")))?;

    for edit in edits {
        if !original.contains(&edit.search) {
            let preview: String = edit.search.chars().take(60).collect();
            return Err(ForgeError::FileOpError(format!(
                "search string not found: \"{preview}\""
            )));
        }
    }

    let mut content = original;
    for edit in edits {
        match content.find(&edit.search) {
            Some(pos) => {
                content.replace_range(pos..pos + edit.search.len(), &edit.replace);
            }
            None => {
                let preview: String = edit.search.chars().take(60).collect();
                return Err(ForgeError::FileOpError(format!(
                    "search string consumed by a prior edit in the same file: \"{preview}\""
                )));
            }
        }
    }

    std::fs::write(path, content).map_err(|e| ForgeError::FileOpError(format!("write failed: {e}")))
}

// --- compilation check ---------------------------------------------------

struct CompileOutcome {
    passed: bool,
    output: String,
}

enum CompileProjectType {
    Rust,
    TypeScript,
    Unknown,
}

fn detect_compile_project_type(project_root: &Path) -> CompileProjectType {
    if project_root.join("Cargo.toml").is_file() {
        CompileProjectType::Rust
    } else if project_root.join("tsconfig.json").is_file() {
        CompileProjectType::TypeScript
    } else {
        CompileProjectType::Unknown
    }
}

fn is_compile_success(output: &str) -> bool {
    !output.contains("error TS") && !output.contains("error[E") && !output.contains("error:")
}

async fn run_with_timeout(project_root: &Path, cmd: &str, args: &[&str], timeout: Duration) -> CompileOutcome {
    let mut command = tokio::process::Command::new(cmd);
    command.args(args).current_dir(project_root).kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => {
            let combined = format!(
                "{}\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            CompileOutcome {
                passed: is_compile_success(&combined),
                output: combined,
            }
        }
        Ok(Err(e)) => CompileOutcome {
            passed: false,
            output: format!("failed to spawn '{cmd}': {e}"),
        },
        Err(_) => CompileOutcome {
            passed: false,
            output: format!("compile check timed out after {timeout:?}"),
        },
    }
}

async fn run_compile_check(project_root: &Path) -> CompileOutcome {
    match detect_compile_project_type(project_root) {
        CompileProjectType::Rust => {
            run_with_timeout(
                project_root,
                "cargo",
                &["check", "--message-format=human"],
                Duration::from_secs(RUST_COMPILE_TIMEOUT_SECS),
            )
            .await
        }
        CompileProjectType::TypeScript => {
            run_with_timeout(
                project_root,
                "npx",
                &["tsc", "--noEmit"],
                Duration::from_secs(TS_COMPILE_TIMEOUT_SECS),
            )
            .await
        }
        CompileProjectType::Unknown => CompileOutcome {
            passed: true,
            output: String::new(),
        },
    }
}

fn truncate_compile_errors(output: &str) -> String {
    let diagnostics: Vec<&str> = output.lines().filter(|l| l.contains("error")).take(MAX_ERROR_DIAGNOSTICS).collect();
    let mut joined = if diagnostics.is_empty() {
        output.to_string()
    } else {
        diagnostics.join("\n")
    };
    if joined.len() > MAX_ERROR_BYTES {
        joined.truncate(MAX_ERROR_BYTES);
        joined.push_str("\n... [truncated]");
    }
    joined
}

/// Mines named learnings out of a compiler output for the patterns that
/// §4.10 calls out by name. Best-effort: a diagnostic that matches none of
/// these shapes mines nothing.
static MISSING_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cannot find module ['\"]([^'\"]+)['\"]").expect("valid regex")
});
static WRONG_EXPORTED_MEMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)has no exported member ['\"]([^'\"]+)['\"]").expect("valid regex")
});
static PROPERTY_MISSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Property '([^']+)' does not exist on type '([^']+)'").expect("valid regex")
});

fn classify_compile_learnings(output: &str) -> Vec<(&'static str, String)> {
    let mut findings = Vec::new();

    if let Some(c) = MISSING_MODULE_RE.captures(output) {
        findings.push(("missing-module", format!("module '{}' could not be found", &c[1])));
    }
    if let Some(c) = WRONG_EXPORTED_MEMBER_RE.captures(output) {
        findings.push((
            "wrong-exported-member",
            format!("'{}' is not exported from the referenced module", &c[1]),
        ));
    }
    if let Some(c) = PROPERTY_MISSING_RE.captures(output) {
        findings.push((
            "property-missing-on-type",
            format!("property '{}' is missing on type '{}'", &c[1], &c[2]),
        ));
    }

    findings
}

// --- self-heal ------------------------------------------------------------

#[derive(Default)]
struct SelfHealOutcome {
    healed: bool,
    attempts: u32,
    cost: f64,
    created: Vec<String>,
    modified: Vec<String>,
    final_output: String,
}

fn code_generation_system_prompt() -> &'static str {
    "You are the execution foreman's code generator. Given a description of a \
     requested change and the relevant files, call submit_code_changes with a \
     files[] array describing every file to create, modify, or edit. Prefer \
     surgical edits (search/replace) over full rewrites when a file already \
     exists and only part of it needs to change."
}

fn repair_system_prompt() -> &'static str {
    "You are in self-heal repair mode. Fix only the listed compiler \
     diagnostics. Do not touch any file outside the set you are given. \
     Prefer edit actions over rewrites, and do not refactor unrelated code."
}

fn build_repair_prompt(
    package: &ContextPackage,
    written: &HashSet<String>,
    errors: &str,
    suggested_fix: Option<&str>,
) -> String {
    let mut files: Vec<&String> = written.iter().collect();
    files.sort();
    let mut prompt = format!(
        "The previous change for \"{}\" failed to compile.\n\nCompiler output:\n{errors}\n",
        package.task.description
    );
    if let Some(fix) = suggested_fix {
        prompt.push_str(&format!("\nSuggested fix: {fix}\n"));
    }
    prompt.push_str(&format!(
        "\nYou may only touch these files: {}\n\nCall submit_code_changes with the minimal fix.",
        files.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    ));
    prompt
}

// --- the foreman itself ---------------------------------------------------

/// C10: generates, applies, compiles, self-heals, and validates a task's
/// code change, then hands the result to the task state machine.
pub struct ExecutionForeman {
    router: Arc<TierRouter>,
    feedback: Arc<FeedbackRouter>,
    patterns: Arc<PatternTracker>,
    store: Arc<dyn ContextStore>,
    validation: ValidationToolBuilder,
    max_self_heal_attempts: u32,
    context_budget: u64,
}

impl ExecutionForeman {
    pub fn new(
        router: Arc<TierRouter>,
        feedback: Arc<FeedbackRouter>,
        patterns: Arc<PatternTracker>,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        Self {
            router,
            feedback,
            patterns,
            store,
            validation: ValidationToolBuilder::new(),
            max_self_heal_attempts: DEFAULT_MAX_SELF_HEAL_ATTEMPTS,
            context_budget: DEFAULT_CONTEXT_BUDGET,
        }
    }

    pub fn with_max_self_heal_attempts(mut self, n: u32) -> Self {
        self.max_self_heal_attempts = n;
        self
    }

    pub fn with_context_budget(mut self, budget: u64) -> Self {
        self.context_budget = budget;
        self
    }

    pub async fn execute(&self, task: &mut Task) -> Result<()> {
        let package = task
            .context_package
            .clone()
            .ok_or_else(|| ForgeError::InputError("task has no context package".into()))?;

        task.transition(TaskState::Executing, "execution_foreman", "beginning execution")?;

        let project_root = PathBuf::from(&task.project_root);
        let mut result = ExecutionResult::new_empty();
        result.files_read = package.code_context.must_read.clone();

        let (gen_result, gen_cost) = self.generate_code_changes(&project_root, &package).await;
        result.cost_breakdown.code_generation += gen_cost;

        let changes = match gen_result {
            Ok(c) => c,
            Err(e) => {
                result.error = Some(e.to_string());
                result.structured_failure = Some(StructuredFailure {
                    phase: FailurePhase::CodeGeneration,
                    code: "code_generation_failed".into(),
                    message: e.to_string(),
                    suggested_fix: None,
                });
                return self.finish(task, result).await;
            }
        };

        let outcome = apply_file_operations(&project_root, &changes.files, None);
        result.files_created = outcome.created;
        result.files_modified = outcome.modified;

        if !outcome.errors.is_empty() {
            let message = outcome.errors.join("; ");
            result.notes.extend(outcome.errors);
            result.error = Some(message.clone());
            result.structured_failure = Some(StructuredFailure {
                phase: FailurePhase::FileOperation,
                code: "file_operation_failed".into(),
                message,
                suggested_fix: None,
            });
            return self.finish(task, result).await;
        }

        let wrote_any_file = !result.files_created.is_empty() || !result.files_modified.is_empty();
        let compile = run_compile_check(&project_root).await;
        result.compilation_attempts = 1;
        result.compilation_passed = compile.passed;

        if !compile.passed {
            if wrote_any_file {
                let written: HashSet<String> = result
                    .files_created
                    .iter()
                    .chain(result.files_modified.iter())
                    .cloned()
                    .collect();
                let heal = self.self_heal(&project_root, &package, &written, &compile.output).await;
                result.cost_breakdown.self_heal += heal.cost;
                result.compilation_attempts += heal.attempts;
                result.compilation_passed = heal.healed;
                result.compilation_self_healed = heal.healed;
                result.files_created.extend(heal.created);
                result.files_modified.extend(heal.modified);

                if !heal.healed {
                    let message = truncate_compile_errors(&heal.final_output);
                    result.error = Some(heal.final_output);
                    result.structured_failure = Some(StructuredFailure {
                        phase: FailurePhase::Compilation,
                        code: "compilation_failed".into(),
                        message,
                        suggested_fix: None,
                    });
                    return self.finish(task, result).await;
                }
            } else {
                let message = truncate_compile_errors(&compile.output);
                result.error = Some(compile.output);
                result.structured_failure = Some(StructuredFailure {
                    phase: FailurePhase::Compilation,
                    code: "compilation_failed".into(),
                    message,
                    suggested_fix: None,
                });
                return self.finish(task, result).await;
            }
        }

        // Phase 4: validation. Never fatal — a validation failure degrades
        // `validationPassed` but does not block the state transition.
        dedupe_in_place(&mut result.files_created);
        dedupe_in_place(&mut result.files_modified);
        let touched: Vec<String> = result
            .files_created
            .iter()
            .chain(result.files_modified.iter())
            .cloned()
            .collect();
        let validation_summary = self.validation.run(&project_root, &package, &touched);
        result.validation_passed = validation_summary.overall_passed;
        result.validation_summary = Some(validation_summary);

        result.success = true;
        self.finish(task, result).await
    }

    async fn generate_code_changes(&self, project_root: &Path, package: &ContextPackage) -> (Result<CodeChanges>, f64) {
        let inputs = build_pack_inputs(package);
        let (files, _summary) = pack::pack(project_root, &inputs, self.context_budget);
        let files = override_must_read_with_full_content(project_root, package, files);
        let prompt = build_code_generation_prompt(package, &files);
        self.call_code_generator(&prompt).await
    }

    async fn call_code_generator(&self, prompt: &str) -> (Result<CodeChanges>, f64) {
        let request = CallRequest::new(Operation::CodeGeneration, code_generation_system_prompt(), prompt)
            .with_tools(vec![submit_code_changes_tool_schema()])
            .with_tool_choice(ToolChoice::Required);

        let call = match self.router.call(request).await {
            Ok(c) => c,
            Err(e) => return (Err(e), 0.0),
        };
        let mut cost = call.cost_usd;

        match extract_code_changes(&call) {
            Ok(c) if c.files.is_empty() => {
                let retry_prompt = format!(
                    "{prompt}\n\nYour previous response had an empty files[] array. \
                     You must return at least one file change."
                );
                let retry_request =
                    CallRequest::new(Operation::CodeGeneration, code_generation_system_prompt(), retry_prompt)
                        .with_tools(vec![submit_code_changes_tool_schema()])
                        .with_tool_choice(ToolChoice::Required);
                match self.router.call(retry_request).await {
                    Ok(retry_call) => {
                        cost += retry_call.cost_usd;
                        match extract_code_changes(&retry_call) {
                            Ok(c2) if !c2.files.is_empty() => (Ok(c2), cost),
                            Ok(_) => (Err(ForgeError::LlmError("EMPTY_FILES_AFTER_RETRY".into())), cost),
                            Err(e) => (Err(e), cost),
                        }
                    }
                    Err(e) => (Err(e), cost),
                }
            }
            other => (other, cost),
        }
    }

    async fn self_heal(
        &self,
        project_root: &Path,
        package: &ContextPackage,
        written: &HashSet<String>,
        first_output: &str,
    ) -> SelfHealOutcome {
        let mut outcome = SelfHealOutcome {
            final_output: first_output.to_string(),
            ..Default::default()
        };
        let pattern_id = format!("self-heal-{}", package.project_type);

        for attempt_number in 1..=self.max_self_heal_attempts {
            let category = categorize_error(&outcome.final_output);
            let ctx = ErrorContext {
                category,
                message: outcome.final_output.clone(),
                file: None,
                line: None,
                stack_trace: None,
                previous_attempts: attempt_number - 1,
                pattern_id: Some(pattern_id.clone()),
                pattern_name: Some("compilation self-heal".to_string()),
            };

            let action = match self.feedback.route_error(&ctx).await {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "feedback router failed during self-heal");
                    break;
                }
            };
            if action.action != ActionKind::Retry {
                info!(reason = %action.reason, action = ?action.action, "self-heal loop exiting");
                break;
            }

            let errors = truncate_compile_errors(&outcome.final_output);
            let prompt = build_repair_prompt(package, written, &errors, action.suggested_fix.as_deref());
            let request = CallRequest::new(Operation::SelfHealRepair, repair_system_prompt(), prompt)
                .with_tools(vec![submit_code_changes_tool_schema()])
                .with_tool_choice(ToolChoice::Required);

            let call = match self.router.call(request).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "self-heal generation call failed");
                    break;
                }
            };
            outcome.cost += call.cost_usd;

            let changes = match extract_code_changes(&call) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "self-heal generation produced no usable changes");
                    break;
                }
            };

            let applied = apply_file_operations(project_root, &changes.files, Some(written));
            outcome.created.extend(applied.created);
            outcome.modified.extend(applied.modified);
            for e in &applied.errors {
                warn!(error = e, "self-heal file operation error");
            }

            let compile = run_compile_check(project_root).await;
            outcome.attempts += 1;
            outcome.final_output = compile.output;

            if compile.passed {
                outcome.healed = true;
                if let Err(e) = self
                    .patterns
                    .record_success(&pattern_id, "compilation self-heal", &package.project_type.to_string())
                    .await
                {
                    warn!(error = %e, "failed to record self-heal pattern success");
                }
                return outcome;
            }
        }

        if let Err(e) = self.patterns.record_failure(&pattern_id, "compilation self-heal").await {
            warn!(error = %e, "failed to record self-heal pattern failure");
        }
        self.mine_compile_error_learnings(&outcome.final_output).await;
        outcome
    }

    async fn mine_compile_error_learnings(&self, output: &str) {
        for (kind, detail) in classify_compile_learnings(output) {
            if let Err(e) = self
                .store
                .store_context(&detail, ContextType::Error, &["self-heal-exhausted".to_string(), kind.to_string()])
                .await
            {
                warn!(error = %e, "failed to persist mined compile-error learning");
            }
        }
    }

    async fn finish(&self, task: &mut Task, mut result: ExecutionResult) -> Result<()> {
        dedupe_in_place(&mut result.files_created);
        dedupe_in_place(&mut result.files_modified);

        let (project_type, package_id_short) = task
            .context_package
            .as_ref()
            .map(|p| (p.project_type.to_string(), p.id.chars().take(8).collect::<String>()))
            .unwrap_or_default();
        let pattern_id = format!("exec-{project_type}-{package_id_short}");

        if result.success {
            if let Err(e) = self.patterns.record_success(&pattern_id, "execution", &project_type).await {
                warn!(error = %e, "failed to record execution pattern success");
            }
        } else if let Err(e) = self.patterns.record_failure(&pattern_id, "execution").await {
            warn!(error = %e, "failed to record execution pattern failure");
        }

        let note = if result.success {
            format!(
                "execution completed: {} created, {} modified",
                result.files_created.len(),
                result.files_modified.len()
            )
        } else {
            format!("execution failed: {}", result.error.clone().unwrap_or_default())
        };
        if let Err(e) = self
            .store
            .store_context(&note, ContextType::Completion, &["execution".to_string(), task.id.clone()])
            .await
        {
            warn!(error = %e, "failed to persist execution decision");
        }

        let target_state = if result.success { TaskState::Reviewing } else { TaskState::Blocked };
        let reason = if result.success {
            "execution succeeded".to_string()
        } else {
            result.error.clone().unwrap_or_else(|| "execution failed".to_string())
        };
        task.execution_result = Some(result);
        task.transition(target_state, "execution_foreman", reason)?;
        Ok(())
    }
}

fn dedupe_in_place(v: &mut Vec<String>) {
    let mut seen = HashSet::new();
    v.retain(|p| seen.insert(p.clone()));
}

fn build_pack_inputs(package: &ContextPackage) -> Vec<PackInput> {
    let mut inputs: Vec<PackInput> = package
        .code_context
        .must_read
        .iter()
        .map(|p| PackInput {
            path: p.clone(),
            reason: "must read".into(),
            priority: Priority::High,
        })
        .collect();
    inputs.extend(
        package
            .code_context
            .related_examples
            .iter()
            .take(MAX_RELATED_EXAMPLES)
            .map(|p| PackInput {
                path: p.clone(),
                reason: "related example".into(),
                priority: Priority::Low,
            }),
    );
    inputs
}

/// Surgical edits need verbatim search strings: any `mustRead` file the
/// packer compressed gets re-read at full content from disk.
fn override_must_read_with_full_content(
    project_root: &Path,
    package: &ContextPackage,
    mut files: Vec<pack::BudgetedFile>,
) -> Vec<pack::BudgetedFile> {
    let must_read: HashSet<&String> = package.code_context.must_read.iter().collect();
    for f in files.iter_mut() {
        if must_read.contains(&f.path)
            && matches!(f.extraction_method, pack::ExtractionMethod::Signatures | pack::ExtractionMethod::Truncated)
        {
            if let Ok(full) = std::fs::read_to_string(project_root.join(&f.path)) {
                f.content = full;
                f.extraction_method = pack::ExtractionMethod::Full;
            }
        }
    }
    files
}

fn build_code_generation_prompt(package: &ContextPackage, files: &[pack::BudgetedFile]) -> String {
    let mut prompt = format!("Request: {}\n", package.task.description);

    if !package.task.acceptance_criteria.is_empty() {
        prompt.push_str("Acceptance criteria:\n");
        for c in &package.task.acceptance_criteria {
            prompt.push_str(&format!("- {c}\n"));
        }
    }
    if !package.constraints.quality.is_empty() {
        prompt.push_str("Quality constraints:\n");
        for c in &package.constraints.quality {
            prompt.push_str(&format!("- {c}\n"));
        }
    }
    if !package.code_context.must_not_modify.is_empty() {
        prompt.push_str(&format!("Do not modify: {}\n", package.code_context.must_not_modify.join(", ")));
    }
    if !package.risks.is_empty() {
        prompt.push_str(&format!("Known risks: {}\n", package.risks.join("; ")));
    }

    prompt.push_str("\nRelevant files:\n");
    for f in files {
        if f.extraction_method == pack::ExtractionMethod::Excluded {
            continue;
        }
        prompt.push_str(&format!("\n--- {} ({}) ---\n{}\n", f.path, f.extraction_method, f.content));
    }

    prompt.push_str("\nRespond by calling submit_code_changes with the files you create, modify, or edit.");
    prompt
}
