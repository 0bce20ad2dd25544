//! Memory Error Types
//!
//! Defines error types for the persona memory system.

use thiserror::Error;

/// Memory result type alias
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
///
/// Dimension mismatches and capacity overflows are deliberately absent:
/// both are resolved in-line (similarity 0, deterministic eviction).
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A dialogue turn was missing its role or content
    #[error("invalid turn: {reason}")]
    InvalidTurn { reason: String },

    /// Snapshot store failed to load or persist a persona
    #[error("persistence failure for persona {persona_id}: {message}")]
    Persistence { persona_id: String, message: String },

    /// External embedding function failed
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl MemoryError {
    /// Create an invalid turn error
    pub fn invalid_turn(reason: impl Into<String>) -> Self {
        Self::InvalidTurn {
            reason: reason.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(persona_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            persona_id: persona_id.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Check if this error is an invalid turn error
    pub fn is_invalid_turn(&self) -> bool {
        matches!(self, Self::InvalidTurn { .. })
    }

    /// Check if this error is a persistence error
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}
