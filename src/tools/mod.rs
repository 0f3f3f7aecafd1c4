// src/tools/mod.rs
// C1: Tool Executor — safe, sandboxed glob/read/grep against a project root.
// Plus the `submit_result` pseudo-tool schema shared by every worker.

use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ignore::should_skip;

pub const GLOB_RESULT_CAP: usize = 100;
pub const GREP_RESULT_CAP: usize = 50;
pub const READ_TRUNCATE_BYTES: usize = 100 * 1024;
pub const GROUND_TRUTH_FILE: &str = "ground-truth.json";

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "c", "cc", "cpp", "h", "hpp", "cs",
    "md", "json", "toml", "yaml", "yml", "txt",
];

/// Whether `path`'s extension is one the engine treats as readable code/doc
/// content, rather than a binary/lockfile/data artifact. Used by both
/// `grep`'s content scan and preparation's candidate-file post-filter.
pub fn has_code_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| CODE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Result shape every C1 operation returns. No exceptions ever escape a
/// tool call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }
}

/// Resolve `path` against `root`, rejecting anything that escapes the root.
pub(crate) fn resolve_within_root(root: &Path, path: &str) -> Option<PathBuf> {
    let candidate = root.join(path);
    // Don't require the path to exist yet (glob targets may not), but do
    // require the lexical join to stay under root — no `..` escapes.
    let root_abs = root.canonicalize().ok()?;
    let candidate_abs = if candidate.exists() {
        candidate.canonicalize().ok()?
    } else {
        // Best-effort normalization for non-existent paths.
        let mut normalized = root_abs.clone();
        for comp in path.split(['/', '\\']) {
            match comp {
                "" | "." => {}
                ".." => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        normalized
    };
    if candidate_abs.starts_with(&root_abs) {
        Some(candidate_abs)
    } else {
        None
    }
}

/// `glob(pattern)` — newline-joined relative paths, ignoring VCS/build/node
/// package directories.
pub fn glob(root: &Path, pattern: &str) -> ToolResult {
    let matcher = match glob_to_matcher(pattern) {
        Some(m) => m,
        None => return ToolResult::err(format!("invalid glob pattern: {pattern}")),
    };

    let mut matches = Vec::new();
    let mut truncated = false;
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.path() == root
                || e.file_name()
                    .to_str()
                    .map(|n| !should_skip(n))
                    .unwrap_or(true)
        })
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if matcher(&rel_str) {
            if matches.len() >= GLOB_RESULT_CAP {
                truncated = true;
                break;
            }
            matches.push(rel_str);
        }
    }
    matches.sort();
    let mut output = matches.join("\n");
    if truncated {
        output.push_str(&format!(
            "\n... truncated to {GLOB_RESULT_CAP} results, refine the pattern for more"
        ));
    }
    ToolResult::ok(output)
}

/// A minimal glob-to-predicate compiler supporting `*`, `**`, and `?`.
fn glob_to_matcher(pattern: &str) -> Option<impl Fn(&str) -> bool + use<>> {
    let regex_str = glob_pattern_to_regex(pattern);
    let re = regex::Regex::new(&regex_str).ok()?;
    Some(move |candidate: &str| re.is_match(candidate))
}

fn glob_pattern_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' => out.push_str("\\."),
            other => out.push(other),
        }
    }
    out.push('$');
    out
}

/// `read(path)` — file contents, truncated past 100 kB, rejecting paths
/// outside root, directories, and the ground-truth oracle.
pub fn read(root: &Path, path: &str) -> ToolResult {
    if Path::new(path)
        .file_name()
        .map(|n| n == GROUND_TRUTH_FILE)
        .unwrap_or(false)
    {
        return ToolResult::err("access denied: ground truth oracle is not readable");
    }

    let resolved = match resolve_within_root(root, path) {
        Some(p) => p,
        None => return ToolResult::err("outside project root"),
    };

    let meta = match std::fs::metadata(&resolved) {
        Ok(m) => m,
        Err(e) => return ToolResult::err(format!("cannot stat '{path}': {e}")),
    };
    if meta.is_dir() {
        return ToolResult::err(format!("'{path}' is a directory, not a file"));
    }

    match std::fs::read(&resolved) {
        Ok(bytes) => {
            let truncated = bytes.len() > READ_TRUNCATE_BYTES;
            let slice = if truncated {
                &bytes[..READ_TRUNCATE_BYTES]
            } else {
                &bytes[..]
            };
            let mut text = String::from_utf8_lossy(slice).to_string();
            if truncated {
                text.push_str(&format!(
                    "\n... [truncated, file is {} bytes, showing first {READ_TRUNCATE_BYTES}]",
                    bytes.len()
                ));
            }
            ToolResult::ok(text)
        }
        Err(e) => ToolResult::err(format!("cannot read '{path}': {e}")),
    }
}

/// `grep(pattern, path?)` — case-insensitive, hard-capped, binary-unreadable
/// files skipped silently.
pub fn grep(root: &Path, pattern: &str, path: Option<&str>) -> ToolResult {
    let re = match regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
    {
        Ok(r) => r,
        Err(e) => return ToolResult::err(format!("invalid pattern: {e}")),
    };

    let search_root = match path {
        Some(p) => match resolve_within_root(root, p) {
            Some(p) => p,
            None => return ToolResult::err("outside project root"),
        },
        None => root.to_path_buf(),
    };

    let mut matches = Vec::new();
    let mut truncated = false;
    'walk: for entry in WalkDir::new(&search_root)
        .into_iter()
        .filter_entry(|e| {
            e.path() == search_root
                || e.file_name()
                    .to_str()
                    .map(|n| !should_skip(n))
                    .unwrap_or(true)
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !CODE_EXTENSIONS.contains(&ext) {
            continue;
        }
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(_) => continue, // binary-unreadable: skip silently
        };
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        for (lineno, line) in content.lines().enumerate() {
            if re.is_match(line) {
                if matches.len() >= GREP_RESULT_CAP {
                    truncated = true;
                    break 'walk;
                }
                matches.push(format!("{rel_str}:{}: {}", lineno + 1, line.trim()));
            }
        }
    }

    let mut output = matches.join("\n");
    if truncated {
        output.push_str(&format!(
            "\n... truncated to {GREP_RESULT_CAP} matches, refine the pattern for more"
        ));
    }
    ToolResult::ok(output)
}

/// The well-known `submit_result` schema published by the Tier Router so
/// every worker speaks it identically.
pub fn submit_result_tool_schema() -> crate::llm::Tool {
    crate::llm::Tool::function(
        "submit_result",
        "Terminate this turn by submitting the final structured result.",
        json!({
            "type": "object",
            "properties": {
                "result": {"type": "object", "description": "The structured result matching the requested schema."},
                "confidence": {"type": "number", "minimum": 0, "maximum": 100}
            },
            "required": ["result", "confidence"]
        }),
    )
}

pub fn glob_tool_schema() -> crate::llm::Tool {
    crate::llm::Tool::function(
        "glob",
        "Find files matching a glob pattern (supports *, **, ?).",
        json!({
            "type": "object",
            "properties": {"pattern": {"type": "string"}},
            "required": ["pattern"]
        }),
    )
}

pub fn read_tool_schema() -> crate::llm::Tool {
    crate::llm::Tool::function(
        "read",
        "Read the contents of a file, relative to the project root.",
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        }),
    )
}

pub fn grep_tool_schema() -> crate::llm::Tool {
    crate::llm::Tool::function(
        "grep",
        "Search file contents for a regex pattern, optionally scoped to a path.",
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "path": {"type": "string"}
            },
            "required": ["pattern"]
        }),
    )
}

/// Exploration tool set used by the Worker Runtime: glob, read,
/// grep, plus the terminal submit_result.
pub fn exploration_tools() -> Vec<crate::llm::Tool> {
    vec![
        glob_tool_schema(),
        read_tool_schema(),
        grep_tool_schema(),
        submit_result_tool_schema(),
    ]
}

/// Dispatch a named exploration tool call against the project root. Returns
/// `None` for `submit_result` (the runtime handles it directly, not via
/// dispatch) and unknown tool names.
pub fn dispatch(root: &Path, name: &str, input: &Value) -> Option<ToolResult> {
    match name {
        "glob" => {
            let pattern = input.get("pattern")?.as_str()?;
            Some(glob(root, pattern))
        }
        "read" => {
            let path = input.get("path")?.as_str()?;
            Some(read(root, path))
        }
        "grep" => {
            let pattern = input.get("pattern")?.as_str()?;
            let path = input.get("path").and_then(|v| v.as_str());
            Some(grep(root, pattern, path))
        }
        other => {
            debug!(tool = other, "unknown exploration tool dispatched");
            None
        }
    }
}
