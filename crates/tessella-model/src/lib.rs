//! Tessella data model.
//!
//! Shared row/column/version types for the Tessella wide-column
//! session layer: ordered row keys, versioned cells guarded by
//! visibility labels, immutable caller authorization contexts, and the
//! per-call flush flag. This crate has no storage dependencies; the
//! session and its backends live in `tessella-core`.

pub mod cell;
pub mod context;
pub mod error;
pub mod flush;
pub mod row;
pub mod row_key;
pub mod visibility;

pub use cell::{current_timestamp, Cell};
pub use context::UserContext;
pub use error::Error;
pub use flush::FlushFlag;
pub use row::{ColumnVersions, Row};
pub use row_key::RowKey;
pub use visibility::Visibility;
