//! Error taxonomy shared by every engine operation.
//!
//! Each public operation returns [`EngineResult`]. Callers at an outer
//! boundary (CLI, tool bridge) convert failures into an [`ErrorEnvelope`]
//! instead of aborting.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("{0}")]
    StatePrecondition(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("computation failed: {0}")]
    ComputationFailure(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::StatePrecondition(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        Self::ComputationFailure(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Category reported to callers.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::Config(_) => ErrorKind::ValidationError,
            Self::StatePrecondition(_) => ErrorKind::StatePrecondition,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ComputationFailure(_) | Self::Io { .. } | Self::Serialization(_) => {
                ErrorKind::ComputationFailure
            }
        }
    }

    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    StatePrecondition,
    NotFound,
    ComputationFailure,
}

/// Structured failure payload: `{ "error": ..., "kind": ..., "detail": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(err: &EngineError) -> Self {
        let detail = match err {
            EngineError::Validation { field, .. } => Some(format!("field: {field}")),
            EngineError::NotFound { kind, id } => Some(format!("{kind}: {id}")),
            EngineError::Io { source, .. } => Some(source.to_string()),
            EngineError::Config(cfg) => cfg.field().map(|f| format!("field: {f}")),
            _ => None,
        };
        Self {
            error: err.to_string(),
            kind: err.kind(),
            detail,
        }
    }
}
