//! Session configuration.
//!
//! `Session::init` takes a flat property map. Recognized keys are
//! listed below; unrecognized keys are logged and ignored, never fatal.
//! Configuration is fixed at `init` and immutable for the session's
//! life, so buffering semantics stay predictable.

use std::collections::HashMap;
use tracing::{debug, warn};

/// Property key: buffer writes or force them through (`true`/`false`).
pub const CONFIG_AUTOFLUSH: &str = "autoflush";

/// Property key: authorization token required for table lifecycle
/// operations.
pub const CONFIG_ADMIN_AUTH: &str = "admin.auth";

/// Property key: buffered-row threshold that triggers an automatic
/// flush when autoflush is off.
pub const CONFIG_MAX_BUFFERED_ROWS: &str = "max_buffered_rows";

/// Session-wide configuration, set once at `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// When true, every save behaves as if `FlushFlag::Flush` were
    /// specified.
    pub autoflush: bool,

    /// Authorization token required for `initialize_table`,
    /// `delete_table`, and `table_list`.
    pub admin_auth: String,

    /// Buffer-size threshold: a deferred save that fills the buffer to
    /// this many mutations triggers a flush.
    pub max_buffered_rows: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autoflush: true,
            admin_auth: "admin".to_string(),
            max_buffered_rows: 1000,
        }
    }
}

impl SessionConfig {
    /// Parse configuration from an `init` property map.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                CONFIG_AUTOFLUSH => {
                    config.autoflush = parse_bool(key, value, config.autoflush);
                }
                CONFIG_ADMIN_AUTH => {
                    config.admin_auth = value.clone();
                }
                CONFIG_MAX_BUFFERED_ROWS => match value.parse() {
                    Ok(n) if n > 0 => config.max_buffered_rows = n,
                    _ => warn!(key, value, "ignoring unparsable buffer threshold"),
                },
                _ => debug!(key, "ignoring unrecognized session property"),
            }
        }
        config
    }
}

fn parse_bool(key: &str, value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        _ => {
            warn!(key, value, "ignoring unparsable boolean property");
            default
        }
    }
}
