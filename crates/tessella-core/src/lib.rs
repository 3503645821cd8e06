//! Tessella core: the session layer over a security-label-aware
//! wide-column store.
//!
//! The [`Session`] is the single point through which all reads, writes,
//! and administrative operations flow. Reads are scoped by a
//! [`tessella_model::UserContext`]: cells whose visibility label the
//! caller's authorizations do not satisfy are absent for that caller.
//! Writes follow the session's buffering policy, with a per-call
//! [`tessella_model::FlushFlag`] override.
//!
//! Storage is pluggable through the [`store::TableStore`] capability;
//! this crate ships an in-memory backend and a sled-backed persistent
//! one.

pub mod config;
pub mod error;
pub mod session;
pub mod store;

pub use config::{SessionConfig, CONFIG_ADMIN_AUTH, CONFIG_AUTOFLUSH, CONFIG_MAX_BUFFERED_ROWS};
pub use error::{Error, Result};
pub use session::Session;
pub use store::{MemoryStore, RowOp, RowScan, ScanRange, SledConfig, SledStore, TableStore};

/// Re-export the data model.
pub use tessella_model as model;
