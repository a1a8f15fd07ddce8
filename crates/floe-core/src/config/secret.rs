//! Secret-typed configuration values.
//!
//! Credentials are read from configuration into [`Secret`], which never
//! prints its contents through `Debug` or `Display`. The plaintext is only
//! reachable through [`Secret::expose`].

use serde::{Deserialize, Deserializer};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A credential value that is redacted when formatted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plaintext value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret([REDACTED])");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_deserialize_from_yaml() {
        #[derive(Debug, Deserialize)]
        struct Credentials {
            password: Secret,
        }

        let creds: Credentials = serde_yaml::from_str("password: s3cr3t").unwrap();
        assert_eq!(creds.password.expose(), "s3cr3t");
        assert!(!format!("{creds:?}").contains("s3cr3t"));
    }
}
