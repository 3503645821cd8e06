//! Sled-backed persistent backend.
//!
//! One sled tree per table, plus a registry tree naming the tables that
//! exist. Each cell is one tree entry: the coordinates live in the
//! encoded key (see [`super::key`]) and the value is an rkyv-encoded
//! [`CellRecord`].

use super::key::{column_prefix, row_prefix, CellKey};
use super::{RowOp, RowScan, ScanRange, TableStore};
use crate::error::{Error, Result};
use rkyv::{Archive, Deserialize, Serialize};
use sled::{Db, IVec, Tree};
use std::path::PathBuf;
use tessella_model::{Cell, Row, RowKey, UserContext, Visibility};
use tracing::debug;

/// Registry tree holding one entry per table.
const TABLES_TREE: &str = "tables";

/// Prefix for per-table data trees.
const TABLE_TREE_PREFIX: &str = "table:";

/// Configuration for the sled backend.
#[derive(Debug, Clone)]
pub struct SledConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for SledConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tessella_data"),
            cache_capacity: 256 * 1024 * 1024,
            compression: true,
            temporary: false,
        }
    }
}

impl SledConfig {
    /// Create a configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    fn to_sled_config(&self) -> sled::Config {
        let config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);
        if self.temporary {
            config.temporary(true)
        } else {
            config.path(&self.path)
        }
    }
}

/// The stored value of one cell.
///
/// Visibility and timestamp live in the encoded key, so the record only
/// carries what the key cannot.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
struct CellRecord {
    /// Raw value bytes. Empty for tombstones.
    value: Vec<u8>,

    /// Whether this cell is a tombstone.
    tombstone: bool,
}

impl CellRecord {
    fn tombstone() -> Self {
        Self {
            value: Vec::new(),
            tombstone: true,
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // Tree values are arbitrary page-buffer slices; the archived
        // layout needs an aligned buffer before access.
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// A `TableStore` over sled.
pub struct SledStore {
    db: Db,
    tables: Tree,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: SledConfig) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        let tables = db.open_tree(TABLES_TREE)?;
        debug!(recovered = db.was_recovered(), "opened sled store");
        Ok(Self { db, tables })
    }

    fn tree_name(table: &str) -> String {
        format!("{TABLE_TREE_PREFIX}{table}")
    }

    fn tree(&self, table: &str) -> Result<Tree> {
        if !self.tables.contains_key(table.as_bytes())? {
            return Err(Error::TableNotFound(table.to_string()));
        }
        Ok(self.db.open_tree(Self::tree_name(table))?)
    }

    fn apply_op(&self, tree: &Tree, op: RowOp) -> Result<()> {
        let mut batch = sled::Batch::default();
        match op {
            RowOp::Put(row) => {
                for (family, qualifier, cell) in row.cells() {
                    let key = CellKey {
                        row: row.key().as_str().to_string(),
                        family: family.to_string(),
                        qualifier: qualifier.to_string(),
                        visibility: cell.visibility.as_str().to_string(),
                        timestamp: cell.timestamp,
                    };
                    let record = CellRecord {
                        value: cell.value.clone(),
                        tombstone: cell.tombstone,
                    };
                    batch.insert(key.encode(), record.to_bytes()?);
                }
            }
            RowOp::DeleteRow(key) => {
                for entry in tree.scan_prefix(row_prefix(&key)) {
                    let (stored_key, _) = entry?;
                    batch.insert(stored_key, CellRecord::tombstone().to_bytes()?);
                }
            }
            RowOp::DeleteColumn {
                key,
                family,
                qualifier,
                visibility,
            } => {
                for entry in tree.scan_prefix(column_prefix(&key, &family, &qualifier)) {
                    let (stored_key, _) = entry?;
                    let cell_key = CellKey::decode(&stored_key)?;
                    if cell_key.visibility == visibility.as_str() {
                        batch.insert(stored_key, CellRecord::tombstone().to_bytes()?);
                    }
                }
            }
            RowOp::AlterVisibility {
                key,
                match_vis,
                new_vis,
            } => {
                for entry in tree.scan_prefix(row_prefix(&key)) {
                    let (stored_key, value) = entry?;
                    let mut cell_key = CellKey::decode(&stored_key)?;
                    if cell_key.visibility == match_vis.as_str() {
                        // The label is part of the key, so a relabel is
                        // a keyed move; value and version are carried
                        // over untouched.
                        cell_key.visibility = new_vis.as_str().to_string();
                        batch.remove(stored_key);
                        batch.insert(cell_key.encode(), value);
                    }
                }
            }
        }
        // apply_batch is atomic, which gives each RowOp its all-or-
        // nothing guarantee.
        tree.apply_batch(batch)?;
        Ok(())
    }
}

impl TableStore for SledStore {
    fn create_table(&self, table: &str) -> Result<()> {
        self.tables.insert(table.as_bytes(), &[])?;
        self.db.open_tree(Self::tree_name(table))?;
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        if self.tables.remove(table.as_bytes())?.is_none() {
            return Err(Error::TableNotFound(table.to_string()));
        }
        self.db.drop_tree(Self::tree_name(table))?;
        Ok(())
    }

    fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.tables.contains_key(table.as_bytes())?)
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.tables.iter() {
            let (name, _) = entry?;
            names.push(String::from_utf8_lossy(&name).into_owned());
        }
        Ok(names)
    }

    fn apply(&self, table: &str, ops: Vec<RowOp>) -> Result<()> {
        let tree = self.tree(table)?;
        for op in ops {
            self.apply_op(&tree, op)?;
        }
        Ok(())
    }

    fn get(&self, table: &str, row_key: &RowKey, context: &UserContext) -> Result<Option<Row>> {
        let tree = self.tree(table)?;
        let mut row = Row::new(row_key.clone());
        for entry in tree.scan_prefix(row_prefix(row_key)) {
            let (stored_key, value) = entry?;
            let (cell_key, cell) = decode_cell(&stored_key, &value)?;
            row.put_cell(cell_key.family, cell_key.qualifier, cell)?;
        }
        Ok(row.project(context))
    }

    fn scan(&self, table: &str, range: ScanRange, context: &UserContext) -> Result<RowScan> {
        let tree = self.tree(table)?;
        let iter = match range {
            ScanRange::All => tree.iter(),
            ScanRange::Range { start, end } => tree.range(row_prefix(&start)..row_prefix(&end)),
            ScanRange::Prefix(prefix) => tree.scan_prefix(prefix.as_bytes()),
        };
        Ok(RowScan::new(GroupedRows {
            iter,
            context: context.clone(),
            current: None,
            done: false,
        }))
    }

    fn sync(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Decode one stored (key, value) entry into its coordinates and cell.
fn decode_cell(stored_key: &[u8], value: &[u8]) -> Result<(CellKey, Cell)> {
    let cell_key = CellKey::decode(stored_key)?;
    let record = CellRecord::from_bytes(value)?;
    let cell = Cell {
        value: record.value,
        visibility: Visibility::new(cell_key.visibility.clone())?,
        timestamp: cell_key.timestamp,
        tombstone: record.tombstone,
    };
    Ok((cell_key, cell))
}

/// Groups the cell-level sled iterator into rows, applying the
/// visibility projection as each row completes. Rows left with no
/// visible cells are suppressed.
struct GroupedRows {
    iter: sled::Iter,
    context: UserContext,
    current: Option<Row>,
    done: bool,
}

impl GroupedRows {
    fn push_cell(&mut self, stored_key: &[u8], value: &[u8]) -> Result<Option<Row>> {
        let (cell_key, cell) = decode_cell(stored_key, value)?;
        let row_key = RowKey::new(cell_key.row.clone())?;

        let completed = match &mut self.current {
            Some(row) if row.key() == &row_key => None,
            _ => self.current.replace(Row::new(row_key.clone())),
        };
        if let Some(row) = self.current.as_mut() {
            row.put_cell(cell_key.family, cell_key.qualifier, cell)?;
        }
        Ok(completed)
    }
}

impl Iterator for GroupedRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.iter.next() {
                Some(Ok((stored_key, value))) => match self.push_cell(&stored_key, &value) {
                    Ok(Some(completed)) => {
                        if let Some(visible) = completed.project(&self.context) {
                            return Some(Ok(visible));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.done = true;
                    match self.current.take().and_then(|row| row.project(&self.context)) {
                        Some(visible) => return Some(Ok(visible)),
                        None => return None,
                    }
                }
            }
        }
    }
}
