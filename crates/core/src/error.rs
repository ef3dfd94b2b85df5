//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Three business failures matter to callers of the delivery workflow:
/// a missing row, an illegal transition (or permission violation), and a
/// payload whose fields contradict each other. Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The transition is illegal in the current state, or the actor may not perform it.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// Cross-field consistency violation in an incoming payload.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::NotAllowed(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
