//! Rows: a key plus a two-level column namespace of versioned cells.

use crate::cell::Cell;
use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::row_key::RowKey;
use crate::visibility::Visibility;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The ordered version history of one (family, qualifier) column.
///
/// Cells are kept newest first, ordered by timestamp descending. Two
/// cells may share a timestamp when they carry different visibility
/// labels; those tie-break on the label string, descending. Inserting a
/// cell with the same (timestamp, visibility) as an existing one
/// replaces it in place, so version histories never contain duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnVersions {
    cells: Vec<Cell>,
}

impl ColumnVersions {
    /// Insert a cell at its ordered position.
    ///
    /// Never removes prior versions; an identical (timestamp,
    /// visibility) coordinate is replaced rather than duplicated.
    pub fn insert(&mut self, cell: Cell) {
        let pos = self.cells.iter().position(|existing| {
            (existing.timestamp, existing.visibility.as_str())
                <= (cell.timestamp, cell.visibility.as_str())
        });
        match pos {
            Some(i)
                if self.cells[i].timestamp == cell.timestamp
                    && self.cells[i].visibility == cell.visibility =>
            {
                self.cells[i] = cell;
            }
            Some(i) => self.cells.insert(i, cell),
            None => self.cells.push(cell),
        }
    }

    /// The newest non-tombstoned cell, if any.
    pub fn latest(&self) -> Option<&Cell> {
        self.cells.iter().find(|c| !c.tombstone)
    }

    /// All non-tombstoned versions, newest first.
    pub fn versions(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| !c.tombstone)
    }

    /// Every stored cell including tombstones, newest first. For
    /// administrative and compaction paths only.
    pub fn versions_raw(&self) -> &[Cell] {
        &self.cells
    }

    /// Whether any non-tombstoned version exists.
    pub fn has_visible(&self) -> bool {
        self.cells.iter().any(|c| !c.tombstone)
    }

    /// Rewrite, in place, the visibility of every cell currently
    /// labeled `match_vis`. Values and timestamps are preserved.
    /// Returns the number of cells relabeled.
    pub fn relabel(&mut self, match_vis: &Visibility, new_vis: &Visibility) -> usize {
        let mut changed = 0;
        for cell in &mut self.cells {
            if &cell.visibility == match_vis {
                cell.visibility = new_vis.clone();
                changed += 1;
            }
        }
        if changed > 0 {
            // Re-sort: the label participates in the tie-break order.
            self.cells
                .sort_by(|a, b| (b.timestamp, b.visibility.as_str()).cmp(&(a.timestamp, a.visibility.as_str())));
        }
        changed
    }

    /// Mark every cell labeled `visibility` as a tombstone.
    pub fn tombstone_matching(&mut self, visibility: &Visibility) -> usize {
        let mut changed = 0;
        for cell in &mut self.cells {
            if !cell.tombstone && &cell.visibility == visibility {
                cell.tombstone = true;
                cell.value.clear();
                changed += 1;
            }
        }
        changed
    }

    /// Mark every cell as a tombstone.
    pub fn tombstone_all(&mut self) -> usize {
        let mut changed = 0;
        for cell in &mut self.cells {
            if !cell.tombstone {
                cell.tombstone = true;
                cell.value.clear();
                changed += 1;
            }
        }
        changed
    }
}

/// A row: one `RowKey` owning family → qualifier → version history.
///
/// A freshly constructed row and one loaded from a backend are
/// represented identically; persistence state is tracked by the
/// session, not the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    key: RowKey,
    families: BTreeMap<String, BTreeMap<String, ColumnVersions>>,
}

impl Row {
    /// Create an empty row for a key.
    pub fn new(key: RowKey) -> Self {
        Self {
            key,
            families: BTreeMap::new(),
        }
    }

    /// The row's key.
    pub fn key(&self) -> &RowKey {
        &self.key
    }

    /// Insert a cell under (family, qualifier).
    ///
    /// Column names must not contain NUL bytes (reserved by backend key
    /// encodings).
    pub fn put_cell(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<String>,
        cell: Cell,
    ) -> Result<()> {
        let family = family.into();
        let qualifier = qualifier.into();
        if family.contains('\x00') || qualifier.contains('\x00') {
            return Err(Error::ColumnNameContainsNul);
        }
        self.families
            .entry(family)
            .or_default()
            .entry(qualifier)
            .or_default()
            .insert(cell);
        Ok(())
    }

    /// The newest non-tombstoned cell of a column, if any.
    pub fn latest(&self, family: &str, qualifier: &str) -> Option<&Cell> {
        self.column(family, qualifier).and_then(ColumnVersions::latest)
    }

    /// The version history of a column, if present.
    pub fn column(&self, family: &str, qualifier: &str) -> Option<&ColumnVersions> {
        self.families.get(family).and_then(|f| f.get(qualifier))
    }

    /// Column family names, in order.
    pub fn family_names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    /// Iterate over (family, qualifier, versions) in column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str, &ColumnVersions)> {
        self.families.iter().flat_map(|(family, quals)| {
            quals
                .iter()
                .map(move |(qual, versions)| (family.as_str(), qual.as_str(), versions))
        })
    }

    /// Iterate over every stored cell, including tombstones.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, &Cell)> {
        self.columns()
            .flat_map(|(f, q, versions)| versions.versions_raw().iter().map(move |c| (f, q, c)))
    }

    /// Whether the row has any non-tombstoned cell at all.
    pub fn has_visible_cells(&self) -> bool {
        self.columns().any(|(_, _, versions)| versions.has_visible())
    }

    /// Number of columns (family, qualifier pairs) present.
    pub fn column_count(&self) -> usize {
        self.families.values().map(BTreeMap::len).sum()
    }

    /// Merge every cell of `other` into this row. Adds versions, never
    /// removes existing ones.
    pub fn merge(&mut self, other: Row) {
        for (family, quals) in other.families {
            let target = self.families.entry(family).or_default();
            for (qual, versions) in quals {
                let column = target.entry(qual).or_default();
                for cell in versions.cells {
                    column.insert(cell);
                }
            }
        }
    }

    /// Project the row to what a caller is allowed to see.
    ///
    /// Drops tombstones and every cell whose visibility the context
    /// does not satisfy; columns and families left empty disappear.
    /// Returns `None` when nothing remains visible, so callers can
    /// suppress the row entirely.
    pub fn project(&self, context: &UserContext) -> Option<Row> {
        let mut families = BTreeMap::new();
        for (family, quals) in &self.families {
            let mut projected_quals = BTreeMap::new();
            for (qual, versions) in quals {
                let visible: Vec<Cell> = versions
                    .versions()
                    .filter(|c| context.satisfies(&c.visibility))
                    .cloned()
                    .collect();
                if !visible.is_empty() {
                    projected_quals.insert(qual.clone(), ColumnVersions { cells: visible });
                }
            }
            if !projected_quals.is_empty() {
                families.insert(family.clone(), projected_quals);
            }
        }
        if families.is_empty() {
            return None;
        }
        Some(Row {
            key: self.key.clone(),
            families,
        })
    }

    /// Restrict the row to the requested (family, qualifier) pairs.
    pub fn select_columns(&self, columns: &[(String, String)]) -> Row {
        let mut families: BTreeMap<String, BTreeMap<String, ColumnVersions>> = BTreeMap::new();
        for (family, qualifier) in columns {
            if let Some(versions) = self.column(family, qualifier) {
                families
                    .entry(family.clone())
                    .or_default()
                    .insert(qualifier.clone(), versions.clone());
            }
        }
        Row {
            key: self.key.clone(),
            families,
        }
    }

    /// Relabel every cell currently labeled `match_vis` across all
    /// columns. Returns the number of cells changed.
    pub fn relabel(&mut self, match_vis: &Visibility, new_vis: &Visibility) -> usize {
        self.families
            .values_mut()
            .flat_map(BTreeMap::values_mut)
            .map(|versions| versions.relabel(match_vis, new_vis))
            .sum()
    }

    /// Tombstone cells of one column matching an exact visibility.
    pub fn tombstone_column(
        &mut self,
        family: &str,
        qualifier: &str,
        visibility: &Visibility,
    ) -> usize {
        self.families
            .get_mut(family)
            .and_then(|f| f.get_mut(qualifier))
            .map(|versions| versions.tombstone_matching(visibility))
            .unwrap_or(0)
    }

    /// Tombstone every cell in the row.
    pub fn tombstone_all(&mut self) -> usize {
        self.families
            .values_mut()
            .flat_map(BTreeMap::values_mut)
            .map(ColumnVersions::tombstone_all)
            .sum()
    }
}
