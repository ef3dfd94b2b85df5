//! Error types of the infrastructure layer.

use thiserror::Error;

use intake_auth::AuthzError;
use intake_core::DomainError;

/// Failures of the in-memory store itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A writer panicked while holding the table lock.
    #[error("store lock poisoned")]
    Poisoned,

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A child row names a parent that does not exist.
    #[error("unknown parent: {0}")]
    UnknownParent(String),

    /// A snapshot could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Error returned by every service operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal transition, or the principal may not act on this tree.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Publication failed after a successful commit (at-least-once; retry may duplicate).
    #[error("publish failed: {0}")]
    Publish(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::NotAllowed(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::NotAllowed(msg) => ServiceError::NotAllowed(msg),
            DomainError::InvalidData(msg) | DomainError::InvalidId(msg) => {
                ServiceError::InvalidData(msg)
            }
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        ServiceError::NotAllowed(err.to_string())
    }
}
