//! Typed, totally ordered row identifiers.
//!
//! A `RowKey` wraps an opaque byte string. Two keys compare equal iff
//! their byte sequences are equal, and ordering is lexicographic over
//! the bytes, so range scans over keys are well-defined.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, totally ordered row identifier.
///
/// Immutable once constructed. Keys must be non-empty and must not
/// contain NUL bytes (NUL is reserved as a separator by backend key
/// encodings).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(String);

impl RowKey {
    /// Create a validated row key.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::EmptyRowKey);
        }
        if key.contains('\x00') {
            return Err(Error::RowKeyContainsNul);
        }
        Ok(Self(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Byte-prefix test: `K` matches prefix `P` iff `K`'s byte sequence
    /// begins with `P`'s byte sequence.
    pub fn starts_with(&self, prefix: &RowKey) -> bool {
        self.0.as_bytes().starts_with(prefix.0.as_bytes())
    }

    /// Prefix test against a raw string prefix.
    pub fn starts_with_str(&self, prefix: &str) -> bool {
        self.0.as_bytes().starts_with(prefix.as_bytes())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({:?})", self.0)
    }
}

impl TryFrom<&str> for RowKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for RowKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
