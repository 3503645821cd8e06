//! Cell visibility labels.
//!
//! A visibility label is a boolean expression over authorization
//! tokens: a single token, conjunctions (`&`), disjunctions (`|`), and
//! parentheses, with `&` binding tighter than `|`. The empty expression
//! is visible to every caller.
//!
//! Labels compare by their normalized expression string; two cells with
//! the same family and qualifier but different labels are distinct
//! cells, so label identity matters to delete and relabel operations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Characters permitted in an authorization token.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/')
}

/// A parsed visibility expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    /// A single authorization token.
    Term(String),
    /// All sub-expressions must be satisfied.
    And(Vec<Expr>),
    /// At least one sub-expression must be satisfied.
    Or(Vec<Expr>),
}

impl Expr {
    fn evaluate(&self, auths: &BTreeSet<String>) -> bool {
        match self {
            Expr::Term(token) => auths.contains(token),
            Expr::And(parts) => parts.iter().all(|p| p.evaluate(auths)),
            Expr::Or(parts) => parts.iter().any(|p| p.evaluate(auths)),
        }
    }
}

/// A cell visibility label.
///
/// Stores the source expression (the identity used for exact-match
/// deletes and relabels) alongside its parsed form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Visibility {
    expr: String,
}

impl Visibility {
    /// Parse and validate a visibility expression.
    pub fn new(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        // Validates eagerly; evaluation re-parses the stored source.
        Parser::new(&expr).parse()?;
        Ok(Self { expr })
    }

    /// The label visible to every caller.
    pub fn public() -> Self {
        Self {
            expr: String::new(),
        }
    }

    /// Whether this is the empty (publicly visible) label.
    pub fn is_public(&self) -> bool {
        self.expr.is_empty()
    }

    /// The source expression string.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Evaluate the label against a set of granted authorizations.
    ///
    /// The empty label evaluates to true for every caller.
    pub fn evaluate(&self, auths: &BTreeSet<String>) -> bool {
        match Parser::new(&self.expr).parse() {
            // Validated at construction, so parse cannot fail here.
            Ok(None) => true,
            Ok(Some(expr)) => expr.evaluate(auths),
            Err(_) => false,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl TryFrom<String> for Visibility {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Visibility {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Visibility> for String {
    fn from(v: Visibility) -> Self {
        v.expr
    }
}

/// Recursive-descent parser over the label grammar.
struct Parser<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    /// Parse the full expression. Returns `None` for the empty label.
    fn parse(mut self) -> Result<Option<Expr>> {
        if self.src.is_empty() {
            return Ok(None);
        }
        let expr = self.parse_or()?;
        if let Some(&(_, c)) = self.chars.peek() {
            return Err(self.error(format!("unexpected character {c:?}")));
        }
        Ok(Some(expr))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        if !self.consume('|') {
            return Ok(first);
        }
        let mut parts = vec![first, self.parse_and()?];
        while self.consume('|') {
            parts.push(self.parse_and()?);
        }
        Ok(Expr::Or(parts))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_primary()?;
        if !self.consume('&') {
            return Ok(first);
        }
        let mut parts = vec![first, self.parse_primary()?];
        while self.consume('&') {
            parts.push(self.parse_primary()?);
        }
        Ok(Expr::And(parts))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.consume('(') {
            let inner = self.parse_or()?;
            if !self.consume(')') {
                return Err(self.error("expected closing parenthesis".to_string()));
            }
            return Ok(inner);
        }
        self.parse_token()
    }

    fn parse_token(&mut self) -> Result<Expr> {
        let mut token = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if is_token_char(c) {
                token.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if token.is_empty() {
            let found = self
                .chars
                .peek()
                .map(|&(_, c)| format!("found {c:?}"))
                .unwrap_or_else(|| "found end of expression".to_string());
            return Err(self.error(format!("expected authorization token, {found}")));
        }
        Ok(Expr::Term(token))
    }

    fn consume(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn error(&self, reason: String) -> Error {
        Error::InvalidVisibility {
            expr: self.src.to_string(),
            reason,
        }
    }
}
