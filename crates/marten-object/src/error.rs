//! Property model error types

use thiserror::Error;

/// Errors surfaced by property model operations.
///
/// A cache miss is never an error; misses fall through to the slow path
/// silently. Everything here propagates synchronously to the immediate
/// caller and is never retried internally.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// A deferred-shape initializer failed. The object is left in a
    /// well-defined, materialized (possibly partially populated) state.
    #[error("InitializerError: {0}")]
    Initializer(String),

    /// Type error (e.g., redefining a non-configurable property)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A value could not be marshaled into the requesting execution
    /// context (the value belongs to a foreign context group).
    #[error("CrossContextError: {0}")]
    CrossContext(String),
}

impl PropertyError {
    /// Create an initializer error
    pub fn initializer(msg: impl Into<String>) -> Self {
        Self::Initializer(msg.into())
    }

    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a cross-context marshal error
    pub fn cross_context(msg: impl Into<String>) -> Self {
        Self::CrossContext(msg.into())
    }
}

/// Result type for property model operations
pub type PropertyResult<T> = std::result::Result<T, PropertyError>;
