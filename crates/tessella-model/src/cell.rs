//! Versioned cells.

use crate::visibility::Visibility;
use serde::{Deserialize, Serialize};

/// A single stored value under a (row, family, qualifier) coordinate.
///
/// Every mutation of a column writes a new `Cell` version rather than
/// overwriting an existing one; only the explicit relabel operation
/// changes a cell in place, and it touches the visibility alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Raw value bytes.
    pub value: Vec<u8>,

    /// Visibility label guarding the cell.
    pub visibility: Visibility,

    /// Version timestamp in microseconds since Unix epoch.
    pub timestamp: u64,

    /// Whether this cell is a tombstone (logical delete pending
    /// physical reclamation). Tombstones are visible only to
    /// administrative paths, never to normal reads.
    pub tombstone: bool,
}

impl Cell {
    /// Create a cell stamped with the current time.
    pub fn new(value: impl Into<Vec<u8>>, visibility: Visibility) -> Self {
        Self::with_timestamp(value, visibility, current_timestamp())
    }

    /// Create a cell with an explicit version timestamp.
    pub fn with_timestamp(value: impl Into<Vec<u8>>, visibility: Visibility, timestamp: u64) -> Self {
        Self {
            value: value.into(),
            visibility,
            timestamp,
            tombstone: false,
        }
    }

    /// Create a tombstone marking a (visibility, timestamp) version as
    /// deleted.
    pub fn tombstone(visibility: Visibility, timestamp: u64) -> Self {
        Self {
            value: Vec::new(),
            visibility,
            timestamp,
            tombstone: true,
        }
    }

    /// The value interpreted as UTF-8, lossily.
    pub fn value_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Current time in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
