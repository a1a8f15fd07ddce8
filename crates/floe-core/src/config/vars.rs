//! `${VAR}` substitution for configuration files.
//!
//! Credentials are normally kept out of the YAML and pulled from the
//! environment at load time:
//!
//! - `$VAR` or `${VAR}` substitutes the value, missing variables are errors
//! - `${VAR:-default}` falls back when VAR is unset or empty
//! - `${VAR-default}` falls back only when VAR is unset
//! - `$$` is a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # literal $
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: name
            (?:
                (:?-)                  # 2: :- or -
                ([^}]*)                # 3: default
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: unbraced name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found, so all missing variables surface at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// Unresolvable references are left in place and reported in `errors`.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| match resolve(caps) {
            Ok(value) => value,
            Err(message) => {
                errors.push(message);
                caps[0].to_string()
            }
        })
        .into_owned();

    InterpolationResult { text, errors }
}

fn resolve(caps: &Captures) -> Result<String, String> {
    if &caps[0] == "$$" {
        return Ok("$".to_string());
    }

    let name = caps
        .get(1)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let empty_means_unset = caps.get(2).is_some_and(|m| m.as_str() == ":-");
    let default = caps.get(3).map(|m| m.as_str());

    match (env::var(name), default) {
        // A value spanning lines could smuggle extra YAML keys in.
        (Ok(value), _) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Some(default)) if value.is_empty() && empty_means_unset => {
            Ok(default.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(format!("environment variable '{name}' is not set")),
    }
}
