//! Core error types.

use thiserror::Error;

/// Session and storage errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Data model error.
    #[error("model error: {0}")]
    Model(#[from] tessella_model::Error),

    /// Operation invoked outside the OPEN session state.
    #[error("illegal session state: session is {state}")]
    IllegalState {
        /// The state the session was actually in.
        state: &'static str,
    },

    /// Caller lacks the authorization an operation requires.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Table names must be non-empty.
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    /// Range query with start greater than end.
    #[error("invalid key range: start {start:?} is greater than end {end:?}")]
    InvalidRange {
        /// Requested start key.
        start: String,
        /// Requested end key.
        end: String,
    },

    /// Row key pattern failed to compile.
    #[error("invalid row key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A stored cell key failed to decode.
    #[error("invalid cell key format")]
    InvalidCellKey,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
