//! Engine and store error types.
//!
//! `StoreError` is what persistence capabilities return; `EngineError` is what
//! the public engine operations surface to request handlers. Generator and
//! translator failures never reach callers: they are recovered with fallback
//! content, and `ExternalCapability` only exists so that recovery paths can
//! classify and log them.

use thiserror::Error;

/// Errors returned by program, task, and evaluation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write lost to a concurrent writer or violated a uniqueness rule.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The store does not implement the requested primitive.
    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A program or task is missing or not owned by the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Required input is missing or inconsistent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Feedback generation or translation failed.
    #[error("external capability failed: {0}")]
    ExternalCapability(String),

    /// A store create or update failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The evaluation store lacks a primitive the operation needs.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify a generator or translator failure before it is recovered.
    pub(crate) fn external(context: &str, err: &anyhow::Error) -> Self {
        EngineError::ExternalCapability(format!("{context}: {err:#}"))
    }

    /// Returns `true` for errors the caller caused (bad input, missing records).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. } | EngineError::Validation(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::Unsupported(op) => EngineError::UnsupportedOperation(op.to_string()),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}
