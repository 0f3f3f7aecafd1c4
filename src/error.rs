// src/error.rs
// Standardized error types for the forge orchestration engine

use thiserror::Error;

/// Closed taxonomy of error kinds the orchestration engine can produce.
/// Every subsystem boundary returns a `Result<T, ForgeError>` rather
/// than throwing or panicking.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("input error: {0}")]
    InputError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("file operation error: {0}")]
    FileOpError(String),

    #[error("compilation error: {0}")]
    CompilationError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("infrastructure error: {0}")]
    InfrastructureError(String),

    #[error("policy error: {0}")]
    PolicyError(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using ForgeError
pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Convert to a user-facing string at a tool/worker boundary.
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }

    /// The §7 error-kind name, used when building `StructuredFailure` records.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InputError(_) => "InputError",
            Self::LlmError(_) => "LLMError",
            Self::FileOpError(_) => "FileOpError",
            Self::CompilationError(_) => "CompilationError",
            Self::ValidationError(_) => "ValidationError",
            Self::InfrastructureError(_)
            | Self::Db(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Http(_)
            | Self::Config(_)
            | Self::Anyhow(_) => "InfrastructureError",
            Self::PolicyError(_) => "PolicyError",
        }
    }
}

impl From<String> for ForgeError {
    fn from(s: String) -> Self {
        ForgeError::InfrastructureError(s)
    }
}

impl From<ForgeError> for String {
    fn from(err: ForgeError) -> Self {
        err.to_string()
    }
}

impl From<tokio::task::JoinError> for ForgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        ForgeError::InfrastructureError(format!("task join failed: {err}"))
    }
}
