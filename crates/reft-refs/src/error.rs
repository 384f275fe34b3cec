//! Error types for reference validation.

use thiserror::Error;

/// Errors that can occur while validating references.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefError {
    /// The reference name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Two updates are out of order or name the same reference.
    #[error("refs out of order: {previous:?} must sort before {name:?}")]
    Unsorted { previous: String, name: String },
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
