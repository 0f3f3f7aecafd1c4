// src/feedback.rs
// C7: Feedback Router — a deterministic error classifier followed by a
// tier-aware decider.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::llm::{CallRequest, Operation, TierRouter, ToolChoice};
use crate::patterns::PatternTracker;
use crate::tools::submit_result_tool_schema;

pub const DEFAULT_MAX_AUTO_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    TypeError,
    CompilationError,
    TestFailure,
    LintError,
    Timeout,
    RuntimeError,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub category: ErrorCategory,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub stack_trace: Option<String>,
    pub previous_attempts: u32,
    pub pattern_id: Option<String>,
    pub pattern_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Retry,
    Escalate,
    HumanSync,
}

#[derive(Debug, Clone)]
pub struct FeedbackAction {
    pub action: ActionKind,
    pub reason: String,
    pub suggested_fix: Option<String>,
    pub pattern_to_update: Option<String>,
}

static TS_DIAGNOSTIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(error\s+)?TS\d{4,}").expect("valid regex"));
static TS2304_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Cannot find name '([^']+)'").expect("valid regex"));
static TS2339_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Property '([^']+)' does not exist on type '([^']+)'").expect("valid regex")
});

/// Deterministic text classifier.
pub fn categorize_error(text: &str) -> ErrorCategory {
    let lower = text.to_lowercase();

    if TS_DIAGNOSTIC_RE.is_match(text) {
        return ErrorCategory::TypeError;
    }
    if lower.contains("is not assignable to type")
        || lower.contains("property") && lower.contains("does not exist on type")
    {
        return ErrorCategory::TypeError;
    }
    if lower.contains("syntaxerror")
        || lower.contains("unexpected token")
        || lower.contains("parse error")
        || lower.contains("error[e")
        || lower.contains("compile error")
        || lower.contains("compilation failed")
    {
        return ErrorCategory::CompilationError;
    }
    if lower.contains("fail")
        && (lower.contains("expected") || lower.contains("received") || lower.contains("assert"))
    {
        return ErrorCategory::TestFailure;
    }
    if lower.starts_with("fail") || lower.contains(" fail ") || lower.contains("failed") {
        if lower.contains("test") || lower.contains("expect") || lower.contains("assert") {
            return ErrorCategory::TestFailure;
        }
    }
    if lower.contains("eslint") || lower.contains("prettier") {
        return ErrorCategory::LintError;
    }
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("etimedout") {
        return ErrorCategory::Timeout;
    }
    if lower.contains("exception")
        || lower.contains("null pointer")
        || lower.contains("nullpointerexception")
        || lower.contains("cannot read prop")
        || (lower.contains("error") && !lower.contains("ts"))
    {
        return ErrorCategory::RuntimeError;
    }
    ErrorCategory::Unknown
}

/// Mine a targeted fix suggestion from a TypeScript diagnostic message:
/// TS2304 -> "Import or declare '<name>'", TS2339 -> "Property '<X>' missing
/// on '<Y>'".
fn mine_type_error_fix(message: &str) -> Option<String> {
    if message.contains("TS2304") {
        if let Some(caps) = TS2304_RE.captures(message) {
            return Some(format!("Import or declare '{}'", &caps[1]));
        }
    }
    if message.contains("TS2339") {
        if let Some(caps) = TS2339_RE.captures(message) {
            return Some(format!("Property '{}' missing on '{}'", &caps[1], &caps[2]));
        }
    }
    None
}

/// Deterministic error classifier followed by a tier-aware decider.
pub struct FeedbackRouter {
    router: Arc<TierRouter>,
    patterns: Arc<PatternTracker>,
    max_auto_retries: AtomicU32,
}

impl FeedbackRouter {
    pub fn new(router: Arc<TierRouter>, patterns: Arc<PatternTracker>) -> Self {
        Self {
            router,
            patterns,
            max_auto_retries: AtomicU32::new(DEFAULT_MAX_AUTO_RETRIES),
        }
    }

    pub fn max_auto_retries(&self) -> u32 {
        self.max_auto_retries.load(Ordering::Relaxed)
    }

    pub fn set_max_auto_retries(&self, value: u32) {
        self.max_auto_retries.store(value, Ordering::Relaxed);
    }

    pub async fn route_error(&self, ctx: &ErrorContext) -> Result<FeedbackAction> {
        if ctx.previous_attempts >= self.max_auto_retries() {
            if let (Some(id), Some(name)) = (&ctx.pattern_id, &ctx.pattern_name) {
                if let Err(e) = self.patterns.record_failure(id, name).await {
                    warn!(error = %e, "failed to record pattern failure on escalation");
                }
            }
            return Ok(FeedbackAction {
                action: ActionKind::Escalate,
                reason: format!(
                    "exceeded max auto retries ({} >= {})",
                    ctx.previous_attempts,
                    self.max_auto_retries()
                ),
                suggested_fix: None,
                pattern_to_update: ctx.pattern_id.clone(),
            });
        }

        match ctx.category {
            ErrorCategory::TypeError => Ok(FeedbackAction {
                action: ActionKind::Retry,
                reason: "type error detected".into(),
                suggested_fix: mine_type_error_fix(&ctx.message),
                pattern_to_update: ctx.pattern_id.clone(),
            }),
            ErrorCategory::CompilationError => Ok(FeedbackAction {
                action: ActionKind::Retry,
                reason: "compilation error: fix the reported syntax issue".into(),
                suggested_fix: Some(
                    "Check for unmatched braces/parens and misplaced punctuation near the reported line.".into(),
                ),
                pattern_to_update: ctx.pattern_id.clone(),
            }),
            ErrorCategory::TestFailure => Ok(FeedbackAction {
                action: ActionKind::Retry,
                reason: "Test failed".into(),
                suggested_fix: None,
                pattern_to_update: ctx.pattern_id.clone(),
            }),
            ErrorCategory::LintError => Ok(FeedbackAction {
                action: ActionKind::Retry,
                reason: "lint error: apply autofix-equivalent changes".into(),
                suggested_fix: Some("autofix".into()),
                pattern_to_update: ctx.pattern_id.clone(),
            }),
            ErrorCategory::Timeout => Ok(FeedbackAction {
                action: ActionKind::Escalate,
                reason: "timeout: likely an infinite loop or runaway process".into(),
                suggested_fix: None,
                pattern_to_update: ctx.pattern_id.clone(),
            }),
            ErrorCategory::RuntimeError => {
                if ctx.previous_attempts == 0 {
                    Ok(FeedbackAction {
                        action: ActionKind::Retry,
                        reason: "runtime error on first attempt".into(),
                        suggested_fix: None,
                        pattern_to_update: ctx.pattern_id.clone(),
                    })
                } else {
                    Ok(FeedbackAction {
                        action: ActionKind::Escalate,
                        reason: "runtime error persisted past first attempt".into(),
                        suggested_fix: None,
                        pattern_to_update: ctx.pattern_id.clone(),
                    })
                }
            }
            ErrorCategory::Unknown => self.resolve_stuck_point(ctx).await,
        }
    }

    /// Unknown category: invoke the opus tier via the stuck-point operation;
    /// expect JSON `{action, reason, suggestedFix?}`. Parse failure or
    /// non-JSON falls back to `human_sync`.
    async fn resolve_stuck_point(&self, ctx: &ErrorContext) -> Result<FeedbackAction> {
        let prompt = format!(
            "An error could not be categorized by the deterministic rules.\n\
             Message: {}\nFile: {:?}\nLine: {:?}\nPrevious attempts: {}\n\n\
             Decide the best action. Respond via submit_result with a JSON object \
             containing action ('retry'|'escalate'|'human_sync'), reason, and an \
             optional suggestedFix.",
            ctx.message, ctx.file, ctx.line, ctx.previous_attempts
        );

        let request = CallRequest::new(
            Operation::ResolveStuckPoint,
            "You are the judgment-tier arbiter for errors the deterministic \
             feedback router could not classify.",
            prompt,
        )
        .with_tools(vec![submit_result_tool_schema()])
        .with_tool_choice(ToolChoice::Tool("submit_result".to_string()));

        let call_result = match self.router.call(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "stuck-point resolution call failed, falling back to human_sync");
                return Ok(human_sync_fallback(ctx));
            }
        };

        let submit = call_result
            .tool_calls
            .iter()
            .find(|tc| tc.function.name == "submit_result");
        let Some(submit) = submit else {
            return Ok(human_sync_fallback(ctx));
        };

        let args: Value = match serde_json::from_str(&submit.function.arguments) {
            Ok(v) => v,
            Err(_) => return Ok(human_sync_fallback(ctx)),
        };
        let result = args.get("result").cloned().unwrap_or(Value::Null);

        let action_str = result.get("action").and_then(|v| v.as_str());
        let action = match action_str {
            Some("retry") => ActionKind::Retry,
            Some("escalate") => ActionKind::Escalate,
            Some("human_sync") => ActionKind::HumanSync,
            _ => return Ok(human_sync_fallback(ctx)),
        };
        let reason = result
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("opus-tier stuck point resolution")
            .to_string();
        let suggested_fix = result
            .get("suggestedFix")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(FeedbackAction {
            action,
            reason,
            suggested_fix,
            pattern_to_update: ctx.pattern_id.clone(),
        })
    }
}

fn human_sync_fallback(ctx: &ErrorContext) -> FeedbackAction {
    FeedbackAction {
        action: ActionKind::HumanSync,
        reason: "could not parse opus-tier stuck point resolution".into(),
        suggested_fix: None,
        pattern_to_update: ctx.pattern_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_ts_diagnostics() {
        assert_eq!(
            categorize_error("error TS2339: Property 'foo' does not exist on type 'Bar'."),
            ErrorCategory::TypeError
        );
    }

    #[test]
    fn categorizes_test_failures() {
        assert_eq!(
            categorize_error("FAIL src/x.test.ts\nExpected 1 but received 2"),
            ErrorCategory::TestFailure
        );
    }

    #[test]
    fn categorizes_lint_errors() {
        assert_eq!(categorize_error("eslint: no-unused-vars"), ErrorCategory::LintError);
    }

    #[test]
    fn categorizes_timeout() {
        assert_eq!(
            categorize_error("ETIMEDOUT connecting to server"),
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn categorizes_compilation_errors() {
        assert_eq!(
            categorize_error("SyntaxError: Unexpected token }"),
            ErrorCategory::CompilationError
        );
    }

    #[test]
    fn mines_ts2304_fix() {
        let fix = mine_type_error_fix("error TS2304: Cannot find name 'fooBar'.").unwrap();
        assert!(fix.contains("fooBar"));
    }

    #[test]
    fn mines_ts2339_fix() {
        let fix =
            mine_type_error_fix("error TS2339: Property 'foo' does not exist on type 'Bar'.")
                .unwrap();
        assert!(fix.contains("foo"));
        assert!(fix.contains("Bar"));
    }
}
