// src/departments/validation.rs
// C11: Validation Tool Builder — task-specific heuristic sanity checks run
// after execution. Never throws: every failure mode degrades to a failed
// `ValidationResult` entry rather than propagating an error up to the
// foreman.

use std::path::Path;

use regex::Regex;

use crate::task::{ContextPackage, ValidationResult, ValidationSummary};
use crate::tools;

/// Builds and runs a small battery of deterministic checks against the
/// touched files for a task: do the acceptance criteria's quoted tokens
/// show up somewhere in what was written, and for refactor-shaped criteria
/// ("no more uses of X"), are there genuinely no remaining references.
pub struct ValidationToolBuilder;

impl Default for ValidationToolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationToolBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Runs every applicable check and folds the results into a summary.
    /// `touched` is every file created or modified during execution.
    pub fn run(&self, project_root: &Path, package: &ContextPackage, touched: &[String]) -> ValidationSummary {
        let mut results = Vec::new();

        results.push(self.check_touched_files_exist(project_root, touched));

        for criterion in &package.task.acceptance_criteria {
            results.push(self.check_acceptance_criterion(project_root, criterion, touched));
        }

        let passed = results.iter().filter(|r| r.passed).count();
        ValidationSummary {
            total_tools: results.len(),
            passed,
            overall_passed: passed == results.len(),
            results,
        }
    }

    fn check_touched_files_exist(&self, project_root: &Path, touched: &[String]) -> ValidationResult {
        let missing: Vec<&String> = touched.iter().filter(|p| !project_root.join(p).is_file()).collect();
        if missing.is_empty() {
            ValidationResult {
                name: "touched-files-exist".into(),
                passed: true,
                detail: format!("all {} touched files are present on disk", touched.len()),
            }
        } else {
            ValidationResult {
                name: "touched-files-exist".into(),
                passed: false,
                detail: format!(
                    "missing on disk: {}",
                    missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
            }
        }
    }

    fn check_acceptance_criterion(&self, project_root: &Path, criterion: &str, touched: &[String]) -> ValidationResult {
        let name = format!("acceptance: {criterion}");

        if let Some(removed_token) = extract_removal_target(criterion) {
            let grep = tools::grep(project_root, &Regex::escape(&removed_token), None);
            let still_present = grep.success && !grep.output.trim().is_empty();
            return ValidationResult {
                passed: !still_present,
                detail: if still_present {
                    format!("still found references to '{removed_token}' in the project")
                } else {
                    format!("no remaining references to '{removed_token}'")
                },
                name,
            };
        }

        let quoted = extract_quoted_tokens(criterion);
        if quoted.is_empty() {
            return ValidationResult {
                name,
                passed: true,
                detail: "no machine-checkable token in this criterion, left to the quality gate".into(),
            };
        }

        let mut found_all = true;
        let mut missing = Vec::new();
        for token in &quoted {
            let present = touched.iter().any(|path| {
                std::fs::read_to_string(project_root.join(path))
                    .map(|content| content.contains(token))
                    .unwrap_or(false)
            });
            if !present {
                found_all = false;
                missing.push(token.clone());
            }
        }

        ValidationResult {
            name,
            passed: found_all,
            detail: if found_all {
                format!("found {} in touched files", quoted.join(", "))
            } else {
                format!("missing from touched files: {}", missing.join(", "))
            },
        }
    }
}

/// Criteria shaped like "remove all uses of 'X'" or "no more references to
/// 'X'" are checked by absence rather than presence.
fn extract_removal_target(criterion: &str) -> Option<String> {
    let lower = criterion.to_lowercase();
    let is_removal = lower.contains("remove") || lower.contains("no more") || lower.contains("no longer");
    if !is_removal {
        return None;
    }
    extract_quoted_tokens(criterion).into_iter().next()
}

fn extract_quoted_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for quote in ['\'', '"', '`'] {
        let mut chars = text.char_indices().peekable();
        let mut start = None;
        for (i, c) in &mut chars {
            if c == quote {
                match start {
                    None => start = Some(i + 1),
                    Some(s) => {
                        if i > s {
                            tokens.push(text[s..i].to_string());
                        }
                        start = None;
                    }
                }
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Architecture, CodeContext, Constraints, HistoricalContext, HumanSync, Patterns, ProjectType, TaskDescription};
    use std::fs;
    use tempfile::TempDir;

    fn package_with_criteria(criteria: Vec<&str>) -> ContextPackage {
        ContextPackage {
            id: "pkg1".into(),
            project_type: ProjectType::Feature,
            prepared_by: "preparation".into(),
            task: TaskDescription {
                description: "test task".into(),
                acceptance_criteria: criteria.into_iter().map(String::from).collect(),
                scope_in: vec![],
                scope_out: vec![],
            },
            architecture: Architecture::default(),
            code_context: CodeContext::default(),
            patterns: Patterns::default(),
            constraints: Constraints::default(),
            risks: vec![],
            history: HistoricalContext::default(),
            human_sync: HumanSync::default(),
        }
    }

    #[test]
    fn passes_when_touched_files_all_exist() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let builder = ValidationToolBuilder::new();
        let package = package_with_criteria(vec![]);
        let summary = builder.run(dir.path(), &package, &["a.rs".to_string()]);
        assert!(summary.overall_passed);
    }

    #[test]
    fn fails_when_touched_file_missing() {
        let dir = TempDir::new().unwrap();
        let builder = ValidationToolBuilder::new();
        let package = package_with_criteria(vec![]);
        let summary = builder.run(dir.path(), &package, &["missing.rs".to_string()]);
        assert!(!summary.overall_passed);
    }

    #[test]
    fn checks_quoted_token_present_in_touched_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "pub fn greet() {}").unwrap();
        let builder = ValidationToolBuilder::new();
        let package = package_with_criteria(vec!["exposes a function named 'greet'"]);
        let summary = builder.run(dir.path(), &package, &["a.rs".to_string()]);
        assert!(summary.overall_passed);
    }

    #[test]
    fn checks_removal_criterion_by_absence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "pub fn clean() {}").unwrap();
        let builder = ValidationToolBuilder::new();
        let package = package_with_criteria(vec!["remove all uses of 'oldHelper'"]);
        let summary = builder.run(dir.path(), &package, &["a.rs".to_string()]);
        assert!(summary.overall_passed);
        assert!(summary.results.iter().any(|r| r.detail.contains("no remaining references")));
    }

    #[test]
    fn extract_quoted_tokens_finds_single_and_double_quotes() {
        let tokens = extract_quoted_tokens("rename 'foo' to \"bar\"");
        assert_eq!(tokens, vec!["foo".to_string(), "bar".to_string()]);
    }
}
