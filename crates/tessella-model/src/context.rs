//! Caller authorization scope.

use crate::visibility::Visibility;
use std::collections::BTreeSet;
use std::fmt;

/// An immutable set of authorization tokens held by a caller.
///
/// Every read operation carries a `UserContext`; cells whose visibility
/// label is not satisfied by the context's tokens are treated as absent
/// for that caller. The context is a plain value with no backend
/// resource attached; equality of contexts is irrelevant, only the
/// token set matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    authorizations: BTreeSet<String>,
}

impl UserContext {
    /// Build a context from a list of authorization tokens.
    ///
    /// Duplicates are collapsed; order does not matter.
    pub fn new<I, S>(authorizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authorizations: authorizations.into_iter().map(Into::into).collect(),
        }
    }

    /// A context holding no authorizations: only publicly labeled cells
    /// are visible to it.
    pub fn anonymous() -> Self {
        Self {
            authorizations: BTreeSet::new(),
        }
    }

    /// The granted token set.
    pub fn authorizations(&self) -> &BTreeSet<String> {
        &self.authorizations
    }

    /// Whether the context holds a specific token.
    pub fn has_authorization(&self, token: &str) -> bool {
        self.authorizations.contains(token)
    }

    /// Whether the context satisfies a visibility label.
    pub fn satisfies(&self, visibility: &Visibility) -> bool {
        visibility.evaluate(&self.authorizations)
    }
}

impl fmt::Display for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, auth) in self.authorizations.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            f.write_str(auth)?;
        }
        write!(f, "]")
    }
}
