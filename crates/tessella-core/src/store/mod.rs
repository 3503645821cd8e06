//! Backend capability for the session layer.
//!
//! A [`TableStore`] provides physical storage and retrieval of rows by
//! key, with label filtering applied on every read path. Backends fully
//! implement the contract; no behavior is shared or inherited. The
//! session selects a backend at construction via `Arc<dyn TableStore>`.

mod memory;
mod sled_store;

pub mod key;

pub use memory::MemoryStore;
pub use sled_store::{SledConfig, SledStore};

use crate::error::Result;
use tessella_model::{Row, RowKey, UserContext, Visibility};

/// A single mutation against one row.
///
/// Backends must apply each op atomically: a concurrent reader sees all
/// of an op's cell writes or none of them.
#[derive(Debug, Clone)]
pub enum RowOp {
    /// Upsert every cell present in the row (adds versions, never
    /// implicitly deletes existing ones).
    Put(Row),

    /// Tombstone every cell under the key.
    DeleteRow(RowKey),

    /// Tombstone the cells matching an exact (family, qualifier,
    /// visibility) triple. Visibility is part of the match key because
    /// two cells may share (family, qualifier) but differ in label.
    DeleteColumn {
        /// Target row.
        key: RowKey,
        /// Column family.
        family: String,
        /// Column qualifier.
        qualifier: String,
        /// Exact label to match.
        visibility: Visibility,
    },

    /// Rewrite, in place, the visibility of every cell on the row whose
    /// current label equals `match_vis`. Values and versions are
    /// preserved.
    AlterVisibility {
        /// Target row.
        key: RowKey,
        /// Label to match.
        match_vis: Visibility,
        /// Replacement label.
        new_vis: Visibility,
    },
}

/// Which rows a scan covers.
#[derive(Debug, Clone)]
pub enum ScanRange {
    /// Every row in the table.
    All,

    /// Keys in `[start, end)`: start inclusive, end exclusive.
    Range {
        /// Inclusive start key.
        start: RowKey,
        /// Exclusive end key.
        end: RowKey,
    },

    /// Keys whose byte sequence begins with the prefix.
    Prefix(RowKey),
}

/// A lazily produced, single-pass sequence of rows.
///
/// Not restartable. Dropping the scan early releases whatever backend
/// resources (cursors, snapshots) it holds, since the iterator owns
/// them.
pub struct RowScan {
    inner: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl RowScan {
    /// Wrap a backend iterator.
    pub fn new(inner: impl Iterator<Item = Result<Row>> + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// Keep only rows whose key satisfies the predicate. Errors pass
    /// through unfiltered.
    pub fn filter_keys(self, predicate: impl Fn(&RowKey) -> bool + Send + 'static) -> Self {
        Self::new(self.inner.filter(move |item| match item {
            Ok(row) => predicate(row.key()),
            Err(_) => true,
        }))
    }
}

impl Iterator for RowScan {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for RowScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RowScan")
    }
}

/// Physical storage capability consumed by the session.
///
/// All read methods apply the visibility filter for the supplied
/// context before returning anything: a cell whose label the context
/// does not satisfy is absent, not an error, and a row left with no
/// visible cells is suppressed entirely. Scans yield rows in ascending
/// key order.
pub trait TableStore: Send + Sync {
    /// Create a table. Creating a table that already exists is a no-op.
    fn create_table(&self, table: &str) -> Result<()>;

    /// Drop a table and everything in it. Dropping an unknown table is
    /// an error.
    fn drop_table(&self, table: &str) -> Result<()>;

    /// Whether a table exists.
    fn has_table(&self, table: &str) -> Result<bool>;

    /// All table names, sorted.
    fn table_names(&self) -> Result<Vec<String>>;

    /// Apply a batch of row mutations. Each [`RowOp`] is atomic; the
    /// batch as a whole is not (no cross-row transaction).
    fn apply(&self, table: &str, ops: Vec<RowOp>) -> Result<()>;

    /// Point lookup, label-filtered.
    fn get(&self, table: &str, row_key: &RowKey, context: &UserContext) -> Result<Option<Row>>;

    /// Ordered scan, label-filtered.
    fn scan(&self, table: &str, range: ScanRange, context: &UserContext) -> Result<RowScan>;

    /// Make previously applied mutations durable.
    fn sync(&self) -> Result<()>;
}
