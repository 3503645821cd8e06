//! Per-call buffering policy override.

use serde::{Deserialize, Serialize};

/// Controls whether a mutation is buffered or forced to storage before
/// the call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlushFlag {
    /// Defer to the session-level autoflush configuration. May buffer
    /// indefinitely until an explicit flush, close, or the buffer
    /// threshold fires.
    #[default]
    Default,

    /// Force the mutation durable before the call returns, regardless
    /// of the autoflush setting.
    Flush,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flag() {
        assert_eq!(FlushFlag::default(), FlushFlag::Default);
    }
}
