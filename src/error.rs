//! Error types for the campaign pipeline.
//!
//! Two families live here. Fatal errors (`DatasetError`, `StageError`,
//! `ConfigError`) abort a stage before anything is written. Per-record errors
//! (`TaskFailure`) never leave the task boundary: they are turned into
//! fallback data by the reconciler.

use std::path::PathBuf;

/// Top-level error type for the campaign.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Malformed or unreadable dataset (the stage's format error).
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Cannot read dataset {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Dataset {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Dataset {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to write dataset {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
}

/// Errors that abort a whole stage (or the whole chain).
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Stage '{stage}' cannot start: required input {path} does not exist")]
    Precondition { stage: String, path: PathBuf },

    #[error(transparent)]
    Format(#[from] DatasetError),

    #[error("Report generation failed: {0}")]
    Report(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Send(String),

    #[error("Transport worker failed: {0}")]
    Worker(String),
}

/// Why a single record's task did not produce a genuine result.
///
/// Always paired with the record index by the scheduler, never inspected
/// to recover one.
#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    #[error("{0}")]
    Enrichment(#[from] LlmError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task never reported a result")]
    NotCompleted,
}

/// Result type alias for the campaign.
pub type Result<T> = std::result::Result<T, Error>;
