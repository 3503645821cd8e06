//! The session façade.
//!
//! Every read, write, and administrative operation against the store
//! flows through a [`Session`]. The session enforces the lifecycle
//! state machine, applies the buffering policy on write paths, and
//! hands reads to the backend, which label-filters them.
//!
//! # Lifecycle
//!
//! `Uninitialized → Open` (after [`Session::init`]) `→ Closed` (after
//! [`Session::close`]). `init` is called exactly once; any other
//! operation outside the open state fails with
//! [`Error::IllegalState`]. `close` flushes buffered mutations before
//! releasing the backend, so it never silently drops writes.
//!
//! # Concurrency
//!
//! Concurrent `save` calls on one session are safe: each buffered
//! mutation is enqueued as a unit under the buffer lock. A `flush`
//! racing a `save` observes a consistent snapshot: the mutation lands
//! entirely in that flush or entirely in the next one. Reads never
//! consult the buffer: buffered-but-unflushed writes are not visible
//! to concurrent reads, consistently. `close` is meant to be called
//! after in-flight operations have completed; calling it concurrently
//! with an in-flight `save` or `flush` is unsupported.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::store::{RowOp, RowScan, ScanRange, TableStore};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use tessella_model::{FlushFlag, Row, RowKey, UserContext, Visibility};
use tracing::{debug, trace};

/// Session lifecycle state.
enum State {
    Uninitialized,
    Open(SessionConfig),
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::Open(_) => "open",
            State::Closed => "closed",
        }
    }
}

/// One deferred mutation awaiting a flush.
#[derive(Clone)]
struct BufferedWrite {
    table: String,
    op: RowOp,
}

/// The single point through which all operations against the backing
/// store flow.
///
/// Rows handed to `save` are copied into the write buffer
/// (copy-on-save): caller-side mutation after the call does not affect
/// what is eventually persisted.
pub struct Session {
    store: Arc<dyn TableStore>,
    state: RwLock<State>,
    buffer: Mutex<Vec<BufferedWrite>>,
}

impl Session {
    /// Create a session over a backend. The session starts
    /// uninitialized; call [`Session::init`] before anything else.
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            state: RwLock::new(State::Uninitialized),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Initialize the session from a property map.
    ///
    /// Recognized keys are documented in [`crate::config`];
    /// unrecognized keys are ignored. Configuration is immutable for
    /// the rest of the session's life.
    pub fn init(&self, properties: &HashMap<String, String>) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            State::Uninitialized => {
                let config = SessionConfig::from_properties(properties);
                debug!(
                    autoflush = config.autoflush,
                    max_buffered_rows = config.max_buffered_rows,
                    "session initialized"
                );
                *state = State::Open(config);
                Ok(())
            }
            _ => Err(Error::IllegalState {
                state: state.name(),
            }),
        }
    }

    /// Build a caller context from a list of authorization tokens.
    pub fn create_user_context<I, S>(&self, authorizations: I) -> Result<UserContext>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_open()?;
        Ok(UserContext::new(authorizations))
    }

    // ---- mutation operations ----

    /// Upsert every cell present in the row. Adds new versions; never
    /// implicitly deletes existing ones.
    pub fn save(&self, table: &str, row: &Row, flag: FlushFlag) -> Result<()> {
        let config = self.require_open()?;
        validate_table(table)?;
        trace!(table, key = %row.key(), "save");
        self.write(&config, table, RowOp::Put(row.clone()), flag)
    }

    /// [`Session::save`] with the default flush flag.
    pub fn save_default(&self, table: &str, row: &Row) -> Result<()> {
        self.save(table, row, FlushFlag::Default)
    }

    /// Save a collection of rows to one table.
    ///
    /// A batch write without cross-row atomicity: each row's mutation
    /// is durable before the call returns when effectively flushed, but
    /// a failure may leave earlier rows applied.
    pub fn save_many<I>(&self, table: &str, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Row>,
    {
        let config = self.require_open()?;
        validate_table(table)?;
        if config.autoflush {
            let ops: Vec<RowOp> = rows.into_iter().map(RowOp::Put).collect();
            if ops.is_empty() {
                return Ok(());
            }
            self.store.apply(table, ops)?;
            return self.store.sync();
        }
        for row in rows {
            self.write(&config, table, RowOp::Put(row), FlushFlag::Default)?;
        }
        Ok(())
    }

    /// Tombstone every cell under the row key. Applied immediately,
    /// not buffered.
    pub fn delete_row(&self, table: &str, key: &RowKey) -> Result<()> {
        self.require_open()?;
        validate_table(table)?;
        debug!(table, key = %key, "delete row");
        self.store.apply(table, vec![RowOp::DeleteRow(key.clone())])?;
        self.store.sync()
    }

    /// Tombstone the cells of one column matching an exact (family,
    /// qualifier, visibility) triple. Applied immediately, not
    /// buffered.
    pub fn delete_column(
        &self,
        row: &Row,
        table: &str,
        family: &str,
        qualifier: &str,
        visibility: &Visibility,
    ) -> Result<()> {
        self.require_open()?;
        validate_table(table)?;
        debug!(table, key = %row.key(), family, qualifier, "delete column");
        self.store.apply(
            table,
            vec![RowOp::DeleteColumn {
                key: row.key().clone(),
                family: family.to_string(),
                qualifier: qualifier.to_string(),
                visibility: visibility.clone(),
            }],
        )?;
        self.store.sync()
    }

    /// Rewrite the visibility of every cell on the row currently
    /// labeled `match_vis`, preserving values and versions.
    pub fn alter_columns_visibility(
        &self,
        table: &str,
        row: &Row,
        match_vis: &Visibility,
        new_vis: &Visibility,
        flag: FlushFlag,
    ) -> Result<()> {
        let config = self.require_open()?;
        validate_table(table)?;
        trace!(table, key = %row.key(), "alter columns visibility");
        self.write(
            &config,
            table,
            RowOp::AlterVisibility {
                key: row.key().clone(),
                match_vis: match_vis.clone(),
                new_vis: new_vis.clone(),
            },
            flag,
        )
    }

    /// Flush buffered mutations to the store. A no-op when the buffer
    /// is empty; with autoflush on there is never anything to flush.
    pub fn flush(&self) -> Result<()> {
        self.require_open()?;
        self.flush_buffer()
    }

    /// Flush pending mutations and release the session.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            State::Open(_) => {
                self.flush_buffer()?;
                *state = State::Closed;
                debug!("session closed");
                Ok(())
            }
            _ => Err(Error::IllegalState {
                state: state.name(),
            }),
        }
    }

    // ---- query operations ----

    /// Exact-key lookup. Returns `None` when no row matches or nothing
    /// on it is visible to the caller.
    pub fn find_by_row_key(
        &self,
        table: &str,
        key: &RowKey,
        context: &UserContext,
    ) -> Result<Option<Row>> {
        self.require_open()?;
        validate_table(table)?;
        self.store.get(table, key, context)
    }

    /// Exact-key lookup restricted to the requested (family,
    /// qualifier) pairs. A row left with none of the requested columns
    /// is reported as `None`.
    pub fn find_by_row_key_columns(
        &self,
        table: &str,
        key: &RowKey,
        columns: &[(String, String)],
        context: &UserContext,
    ) -> Result<Option<Row>> {
        self.require_open()?;
        validate_table(table)?;
        Ok(self
            .store
            .get(table, key, context)?
            .map(|row| row.select_columns(columns))
            .filter(|row| row.column_count() > 0))
    }

    /// Rows with keys in `[start, end)`, ascending. `start > end` is a
    /// malformed-input error raised before any backend call.
    pub fn find_by_row_key_range(
        &self,
        table: &str,
        start: &RowKey,
        end: &RowKey,
        context: &UserContext,
    ) -> Result<RowScan> {
        self.require_open()?;
        validate_table(table)?;
        if start > end {
            return Err(Error::InvalidRange {
                start: start.as_str().to_string(),
                end: end.as_str().to_string(),
            });
        }
        self.store.scan(
            table,
            ScanRange::Range {
                start: start.clone(),
                end: end.clone(),
            },
            context,
        )
    }

    /// Rows whose key begins with the prefix, ascending.
    pub fn find_by_row_starts_with(
        &self,
        table: &str,
        prefix: &RowKey,
        context: &UserContext,
    ) -> Result<RowScan> {
        self.require_open()?;
        validate_table(table)?;
        self.store
            .scan(table, ScanRange::Prefix(prefix.clone()), context)
    }

    /// Rows whose full key matches the pattern (anchored match, not a
    /// search). An invalid pattern fails fast.
    pub fn find_by_row_key_regex(
        &self,
        table: &str,
        pattern: &str,
        context: &UserContext,
    ) -> Result<RowScan> {
        self.require_open()?;
        validate_table(table)?;
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        let scan = self.store.scan(table, ScanRange::All, context)?;
        Ok(scan.filter_keys(move |key| regex.is_match(key.as_str())))
    }

    /// Every visible row in the table, ascending.
    pub fn find_all(&self, table: &str, context: &UserContext) -> Result<RowScan> {
        self.require_open()?;
        validate_table(table)?;
        self.store.scan(table, ScanRange::All, context)
    }

    /// Exact count of rows visible to the caller after label
    /// filtering.
    pub fn row_count(&self, table: &str, context: &UserContext) -> Result<u64> {
        let mut count = 0u64;
        for row in self.find_all(table, context)? {
            row?;
            count += 1;
        }
        Ok(count)
    }

    // ---- administrative operations ----

    /// Create a table. Requires the admin authorization; idempotent
    /// for an existing table.
    pub fn initialize_table(&self, table: &str, context: &UserContext) -> Result<()> {
        let config = self.require_open()?;
        validate_table(table)?;
        require_admin(&config, context)?;
        debug!(table, "initialize table");
        self.store.create_table(table)
    }

    /// Drop a table and everything in it. Requires the admin
    /// authorization.
    pub fn delete_table(&self, table: &str, context: &UserContext) -> Result<()> {
        let config = self.require_open()?;
        validate_table(table)?;
        require_admin(&config, context)?;
        debug!(table, "delete table");
        self.store.drop_table(table)
    }

    /// All table names in the store. Requires the admin authorization.
    pub fn table_list(&self, context: &UserContext) -> Result<Vec<String>> {
        let config = self.require_open()?;
        require_admin(&config, context)?;
        self.store.table_names()
    }

    // ---- internals ----

    fn require_open(&self) -> Result<SessionConfig> {
        match &*self.state.read() {
            State::Open(config) => Ok(config.clone()),
            other => Err(Error::IllegalState {
                state: other.name(),
            }),
        }
    }

    /// Route one mutation through the buffering policy.
    fn write(&self, config: &SessionConfig, table: &str, op: RowOp, flag: FlushFlag) -> Result<()> {
        if config.autoflush || flag == FlushFlag::Flush {
            self.store.apply(table, vec![op])?;
            return self.store.sync();
        }

        let hit_threshold = {
            let mut buffer = self.buffer.lock();
            buffer.push(BufferedWrite {
                table: table.to_string(),
                op,
            });
            buffer.len() >= config.max_buffered_rows
        };
        if hit_threshold {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Drain and apply the buffer. On failure the unapplied tail
    /// (including the failed mutation, whose row state is unchanged)
    /// is put back at the front of the buffer so the caller can retry.
    fn flush_buffer(&self) -> Result<()> {
        let drained = mem::take(&mut *self.buffer.lock());
        if drained.is_empty() {
            return Ok(());
        }
        debug!(mutations = drained.len(), "flushing write buffer");
        for (i, write) in drained.iter().enumerate() {
            if let Err(e) = self.store.apply(&write.table, vec![write.op.clone()]) {
                let mut buffer = self.buffer.lock();
                let mut requeued = drained[i..].to_vec();
                requeued.append(&mut *buffer);
                *buffer = requeued;
                return Err(e);
            }
        }
        self.store.sync()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state.read().name())
            .field("buffered", &self.buffer.lock().len())
            .finish()
    }
}

fn validate_table(table: &str) -> Result<()> {
    if table.is_empty() {
        return Err(Error::InvalidTableName(table.to_string()));
    }
    Ok(())
}

fn require_admin(config: &SessionConfig, context: &UserContext) -> Result<()> {
    if context.has_authorization(&config.admin_auth) {
        Ok(())
    } else {
        Err(Error::AccessDenied(format!(
            "table administration requires the {:?} authorization",
            config.admin_auth
        )))
    }
}
