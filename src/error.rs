//! # Engine Error Types
//!
//! Structured error handling for the command pipeline and the execution tree.
//!
//! Every [`EngineError`] belongs to one [`ErrorKind`] so callers can tell usage
//! mistakes, data-integrity problems, retryable conflicts and evaluation failures
//! apart without matching on individual variants.

use crate::config::ConfigurationError;
use crate::persistence::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected at the call boundary, never reached persistence
    Usage,
    /// Referenced entity or node missing, or the tree is inconsistent
    DataIntegrity,
    /// Concurrent modification detected; the command may be retried from scratch
    Conflict,
    /// A node behavior could not compute its outcome
    Evaluation,
    /// Broken internal invariant
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage => write!(f, "usage"),
            Self::DataIntegrity => write!(f, "data_integrity"),
            Self::Conflict => write!(f, "conflict"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Data integrity violation: {message} (execution: {execution_id:?}, node: {node_id:?})")]
    DataIntegrity {
        message: String,
        execution_id: Option<Uuid>,
        node_id: Option<String>,
    },

    #[error("Concurrent modification of {entity} '{id}'")]
    Conflict { entity: &'static str, id: String },

    #[error("Evaluation failed for decision {decision_key:?} at node {node_id:?}: {message}")]
    Evaluation {
        decision_key: Option<String>,
        node_id: Option<String>,
        message: String,
    },

    #[error("Decision '{decision_key}' produced {count} results where exactly one was expected")]
    SingleResultViolation { decision_key: String, count: usize },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Persistence error: {0}")]
    Persistence(PersistenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. }
            | Self::IllegalState { .. }
            | Self::SingleResultViolation { .. }
            | Self::Configuration(_) => ErrorKind::Usage,
            Self::NotFound { .. } | Self::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Evaluation { .. } => ErrorKind::Evaluation,
            Self::Persistence(_)
            | Self::Transaction { .. }
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole command may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Execution id carried by the error, if any
    pub fn execution_id(&self) -> Option<Uuid> {
        match self {
            Self::DataIntegrity { execution_id, .. } => *execution_id,
            Self::NotFound { entity, id } if *entity == "execution" => id.parse().ok(),
            _ => None,
        }
    }

    /// Node id carried by the error, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::DataIntegrity { node_id, .. } | Self::Evaluation { node_id, .. } => {
                node_id.as_deref()
            }
            _ => None,
        }
    }
}

impl From<PersistenceError> for EngineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Conflict { entity, id } => Self::Conflict { entity, id },
            other => Self::Persistence(other),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Helper for usage errors
pub fn invalid_argument(message: impl Into<String>) -> EngineError {
    EngineError::InvalidArgument {
        message: message.into(),
    }
}

/// Helper for illegal-state usage errors
pub fn illegal_state(message: impl Into<String>) -> EngineError {
    EngineError::IllegalState {
        message: message.into(),
    }
}

/// Helper for data-integrity errors scoped to an execution and node
pub fn data_integrity(
    message: impl Into<String>,
    execution_id: Option<Uuid>,
    node_id: Option<&str>,
) -> EngineError {
    EngineError::DataIntegrity {
        message: message.into(),
        execution_id,
        node_id: node_id.map(str::to_string),
    }
}

/// Helper for a missing execution
pub fn execution_not_found(id: Uuid) -> EngineError {
    EngineError::NotFound {
        entity: "execution",
        id: id.to_string(),
    }
}

/// Rejects a missing or empty mandatory identifier
pub fn require_id(name: &str, value: Option<&str>) -> EngineResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        other => Err(invalid_argument(format!(
            "The {name} is mandatory, but '{}' has been provided.",
            other.unwrap_or("null")
        ))),
    }
}
