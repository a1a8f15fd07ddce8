//! Alias identifier for endpoints mounted into the engine.
//!
//! Every object store, relational database and the lake catalog itself is
//! mounted under a `SourceKey`. The key doubles as the identifier used in
//! generated statements, so it is restricted to plain SQL identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alias under which an endpoint is mounted in the engine namespace.
///
/// This is a transparent wrapper around a String that provides
/// consistent identification semantics across the codebase.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    /// Create a new key from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier string.
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Whether the key is usable as an unquoted identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use floe_core::SourceKey;
    ///
    /// assert!(SourceKey::new("lake").is_identifier());
    /// assert!(SourceKey::new("_pg2").is_identifier());
    /// assert!(!SourceKey::new("2pg").is_identifier());
    /// assert!(!SourceKey::new("my-bucket").is_identifier());
    /// assert!(!SourceKey::new("").is_identifier());
    /// ```
    pub fn is_identifier(&self) -> bool {
        is_identifier(&self.0)
    }

    /// Name of the secret registered for this key with the given suffix.
    ///
    /// ```
    /// use floe_core::SourceKey;
    ///
    /// assert_eq!(SourceKey::new("pgsrc").secret_name(Some("secret")), "pgsrc_secret");
    /// assert_eq!(SourceKey::new("lake_files").secret_name(None), "lake_files");
    /// ```
    pub fn secret_name(&self, suffix: Option<&str>) -> String {
        match suffix {
            Some(suffix) => format!("{}_{}", self.0, suffix),
            None => self.0.clone(),
        }
    }
}

/// Check whether `value` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
