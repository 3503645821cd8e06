//! In-memory reference backend.

use super::{RowOp, RowScan, ScanRange, TableStore};
use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tessella_model::{Row, RowKey, UserContext};

type TableData = Arc<RwLock<BTreeMap<RowKey, Row>>>;

/// A `TableStore` backed by ordered in-memory maps.
///
/// The reference backend: rows live in a `BTreeMap` per table, so scans
/// come back in ascending key order for free. Scans materialize their
/// visible result set under a read lock and then iterate without
/// holding it, so abandoning a scan early holds no lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, TableData>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, table: &str) -> Result<TableData> {
        self.tables
            .get(table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }
}

impl TableStore for MemoryStore {
    fn create_table(&self, table: &str) -> Result<()> {
        self.tables
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())));
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.tables.contains_key(table))
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn apply(&self, table: &str, ops: Vec<RowOp>) -> Result<()> {
        let data = self.table(table)?;
        let mut rows = data.write();
        for op in ops {
            match op {
                RowOp::Put(row) => match rows.get_mut(row.key()) {
                    Some(existing) => existing.merge(row),
                    None => {
                        rows.insert(row.key().clone(), row);
                    }
                },
                RowOp::DeleteRow(key) => {
                    if let Some(row) = rows.get_mut(&key) {
                        row.tombstone_all();
                    }
                }
                RowOp::DeleteColumn {
                    key,
                    family,
                    qualifier,
                    visibility,
                } => {
                    if let Some(row) = rows.get_mut(&key) {
                        row.tombstone_column(&family, &qualifier, &visibility);
                    }
                }
                RowOp::AlterVisibility {
                    key,
                    match_vis,
                    new_vis,
                } => {
                    if let Some(row) = rows.get_mut(&key) {
                        row.relabel(&match_vis, &new_vis);
                    }
                }
            }
        }
        Ok(())
    }

    fn get(&self, table: &str, row_key: &RowKey, context: &UserContext) -> Result<Option<Row>> {
        let data = self.table(table)?;
        let rows = data.read();
        Ok(rows.get(row_key).and_then(|row| row.project(context)))
    }

    fn scan(&self, table: &str, range: ScanRange, context: &UserContext) -> Result<RowScan> {
        let data = self.table(table)?;
        let rows = data.read();

        let visible: Vec<Row> = match range {
            ScanRange::All => rows.values().filter_map(|r| r.project(context)).collect(),
            ScanRange::Range { start, end } => rows
                .range((Bound::Included(start), Bound::Excluded(end)))
                .filter_map(|(_, r)| r.project(context))
                .collect(),
            ScanRange::Prefix(prefix) => rows
                .range((Bound::Included(prefix.clone()), Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(&prefix))
                .filter_map(|(_, r)| r.project(context))
                .collect(),
        };

        Ok(RowScan::new(visible.into_iter().map(Ok)))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
