//! Model-level error types.

use thiserror::Error;

/// Errors raised while constructing or validating model types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Row keys must contain at least one byte.
    #[error("row key cannot be empty")]
    EmptyRowKey,

    /// Row keys participate in order-preserving key encoding and must
    /// not contain NUL bytes.
    #[error("row key cannot contain NUL bytes")]
    RowKeyContainsNul,

    /// A visibility label expression failed to parse.
    #[error("invalid visibility expression {expr:?}: {reason}")]
    InvalidVisibility {
        /// The offending expression.
        expr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Column family and qualifier names must not contain NUL bytes.
    #[error("column name cannot contain NUL bytes")]
    ColumnNameContainsNul,
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, Error>;
