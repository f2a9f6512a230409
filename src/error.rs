use std::path::PathBuf;
use thiserror::Error;

/// Typed error hierarchy for the ingestion pipeline.
///
/// Stage-local problems (a missing transcript, a failed summary) are carried
/// as result values by their stages and never reach this type. What lands
/// here is either fatal to a batch (`Persistence`, `Conflict`) or a setup
/// problem surfaced before any work starts.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to persist {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("Store {path} kept changing underneath us, giving up")]
    Conflict { path: PathBuf },

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),

    #[error("{0}")]
    Yaml(String),

    #[error("{0}")]
    Other(String),
}

impl IngestError {
    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IngestError::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Persistence and conflict errors abort the enclosing batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Persistence { .. } | IngestError::Conflict { .. }
        )
    }
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for IngestError {
    fn from(e: serde_yaml::Error) -> Self {
        IngestError::Yaml(e.to_string())
    }
}

/// Allows `.ok_or_else(|| format!(…))?` to coerce into IngestError.
impl From<String> for IngestError {
    fn from(s: String) -> Self {
        IngestError::Other(s)
    }
}

impl From<&str> for IngestError {
    fn from(s: &str) -> Self {
        IngestError::Other(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
