//! Common error types shared across the floe crates.
//!
//! This module defines error types for configuration, metrics and retry
//! handling that do not depend on any particular external system.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// A required field is empty.
    #[snafu(display("'{field}' cannot be empty"))]
    EmptyField { field: String },

    /// An alias cannot be used as an identifier inside the engine.
    #[snafu(display(
        "Invalid alias '{alias}': must start with a letter or underscore and contain only letters, digits and underscores"
    ))]
    InvalidAlias { alias: String },

    /// A numeric setting is out of range.
    #[snafu(display("'{field}' must be greater than zero"))]
    NotPositive { field: String },

    /// Resource conflict detected (e.g., two endpoints mounted under the same alias).
    #[snafu(display("Resource conflict: {message}"))]
    ResourceConflict { message: String },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics server already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,
}

// ============ Retry Errors ============

/// Errors returned by [`crate::retry::retry_with_backoff`] when it gives up.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Shutdown was requested before the operation succeeded.
    #[snafu(display("{operation} cancelled after {attempts} attempt(s)"))]
    Cancelled { operation: String, attempts: u32 },

    /// The attempt budget ran out.
    #[snafu(display("{operation} failed after {attempts} attempt(s): {source}"))]
    Exhausted {
        operation: String,
        attempts: u32,
        source: E,
    },
}
