// src/pack.rs
// C3: Context Budget Packer — turns a prioritized file list into a
// token-bounded selection using full content / signatures / truncation
//.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::llm::estimate_tokens;
use crate::task::Priority;

pub const DEFAULT_BUDGET: u64 = 40_000;

#[derive(Debug, Clone)]
pub struct PackInput {
    pub path: String,
    pub reason: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionMethod {
    Full,
    Signatures,
    Truncated,
    Excluded,
}

#[derive(Debug, Clone)]
pub struct BudgetedFile {
    pub path: String,
    pub content: String,
    pub extraction_method: ExtractionMethod,
    pub allocated_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackSummary {
    pub total_files: usize,
    pub included_full: usize,
    pub included_signatures: usize,
    pub included_truncated: usize,
    pub excluded: usize,
    pub total_tokens_used: u64,
    pub budget_remaining: u64,
}

fn priority_weight(p: Priority) -> u64 {
    match p {
        Priority::High => 3,
        Priority::Medium => 2,
        Priority::Low => 1,
    }
}

/// Minimum token floor a `high` priority file gets, if its fair share would
/// otherwise round to nothing.
const HIGH_PRIORITY_FLOOR: u64 = 500;

/// Pack `inputs` against `budget` tokens, preserving input order in the
/// output.
pub fn pack(project_root: &Path, inputs: &[PackInput], budget: u64) -> (Vec<BudgetedFile>, PackSummary) {
    let mut summary = PackSummary {
        total_files: inputs.len(),
        ..Default::default()
    };

    if budget == 0 || inputs.is_empty() {
        let files = inputs
            .iter()
            .map(|i| BudgetedFile {
                path: i.path.clone(),
                content: String::new(),
                extraction_method: ExtractionMethod::Excluded,
                allocated_tokens: 0,
            })
            .collect();
        summary.excluded = inputs.len();
        summary.budget_remaining = budget;
        return (files, summary);
    }

    let total_weight: u64 = inputs.iter().map(|i| priority_weight(i.priority)).sum();
    let mut allocations: Vec<u64> = inputs
        .iter()
        .map(|i| {
            let share = (budget as f64) * (priority_weight(i.priority) as f64) / (total_weight as f64);
            let mut share = share.floor() as u64;
            if i.priority == Priority::High && share < HIGH_PRIORITY_FLOOR {
                share = HIGH_PRIORITY_FLOOR.min(budget);
            }
            share
        })
        .collect();

    // Clamp total allocation to budget (floor rounding + the high-priority
    // floor can push the sum slightly over).
    let allocated_sum: u64 = allocations.iter().sum();
    if allocated_sum > budget {
        let excess = allocated_sum - budget;
        let mut remaining_excess = excess;
        for alloc in allocations.iter_mut().rev() {
            if remaining_excess == 0 {
                break;
            }
            let take = (*alloc).min(remaining_excess);
            *alloc -= take;
            remaining_excess -= take;
        }
    }

    let mut used: u64 = 0;
    let mut files = Vec::with_capacity(inputs.len());

    for (input, allocation) in inputs.iter().zip(allocations.iter()) {
        let remaining_budget = budget.saturating_sub(used);
        let allocation = (*allocation).min(remaining_budget);
        let full_content = std::fs::read_to_string(project_root.join(&input.path)).ok();

        let (method, content, tokens) = match full_content {
            None => (ExtractionMethod::Excluded, String::new(), 0),
            Some(content) => {
                let full_tokens = estimate_tokens(&content);
                if full_tokens <= allocation {
                    (ExtractionMethod::Full, content, full_tokens)
                } else {
                    let sig = extract_signatures(&content);
                    let sig_tokens = estimate_tokens(&sig);
                    if sig_tokens <= allocation {
                        (ExtractionMethod::Signatures, sig, sig_tokens)
                    } else {
                        let truncated = smart_truncate(&content, allocation);
                        let trunc_tokens = estimate_tokens(&truncated);
                        if trunc_tokens <= allocation && allocation > 0 {
                            (ExtractionMethod::Truncated, truncated, trunc_tokens)
                        } else {
                            (ExtractionMethod::Excluded, String::new(), 0)
                        }
                    }
                }
            }
        };

        match method {
            ExtractionMethod::Full => summary.included_full += 1,
            ExtractionMethod::Signatures => summary.included_signatures += 1,
            ExtractionMethod::Truncated => summary.included_truncated += 1,
            ExtractionMethod::Excluded => summary.excluded += 1,
        }

        used += tokens;
        files.push(BudgetedFile {
            path: input.path.clone(),
            content,
            extraction_method: method,
            allocated_tokens: tokens,
        });
    }

    summary.total_tokens_used = used;
    summary.budget_remaining = budget.saturating_sub(used);
    (files, summary)
}

/// Keep import lines, exported declarations, function/class signatures,
/// class members without bodies, and top-level comments.
fn extract_signatures(content: &str) -> String {
    let mut out = String::new();
    let mut depth = 0i32;
    for line in content.lines() {
        let trimmed = line.trim();
        let is_top_level = depth == 0;
        let looks_like_decl = trimmed.starts_with("use ")
            || trimmed.starts_with("import ")
            || trimmed.starts_with("from ")
            || trimmed.starts_with("require(")
            || trimmed.starts_with("pub fn ")
            || trimmed.starts_with("fn ")
            || trimmed.starts_with("pub struct ")
            || trimmed.starts_with("struct ")
            || trimmed.starts_with("pub enum ")
            || trimmed.starts_with("enum ")
            || trimmed.starts_with("pub trait ")
            || trimmed.starts_with("trait ")
            || trimmed.starts_with("impl ")
            || trimmed.starts_with("export ")
            || trimmed.starts_with("function ")
            || trimmed.starts_with("class ")
            || trimmed.starts_with("def ")
            || trimmed.starts_with("interface ")
            || trimmed.starts_with("type ")
            || trimmed.starts_with("///")
            || trimmed.starts_with("//!")
            || trimmed.starts_with("#[")
            || trimmed.starts_with('#'); // markdown headers / python decorators

        if is_top_level && looks_like_decl {
            out.push_str(line);
            out.push('\n');
        }

        depth += trimmed.matches('{').count() as i32;
        depth -= trimmed.matches('}').count() as i32;
        depth = depth.max(0);
    }
    out
}

/// Preserve structural boundaries: don't split mid-identifier, keep opening
/// braces paired with their closers where possible.
fn smart_truncate(content: &str, budget_tokens: u64) -> String {
    let target_chars = (budget_tokens.saturating_mul(4)) as usize;
    if content.len() <= target_chars {
        return content.to_string();
    }
    let mut cut = target_chars.min(content.len());
    // Walk back to a char boundary, then to a line boundary.
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    if let Some(last_newline) = content[..cut].rfind('\n') {
        cut = last_newline;
    }
    let mut truncated = content[..cut].to_string();
    truncated.push_str("\n... [truncated to fit context budget]");
    truncated
}
