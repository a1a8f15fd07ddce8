//! Configuration for the floe lake attacher.

mod connection;

use floe_core::config::is_identifier;
use floe_core::error::{
    EmptyFieldSnafu, EnvInterpolationSnafu, InvalidAliasSnafu, NotPositiveSnafu,
    ReadFileSnafu, ResourceConflictSnafu, YamlParseSnafu,
};
use floe_core::{FixedBackoff, MetricsConfig, Resource, SourceKey, interpolate};
use serde::Deserialize;
use snafu::prelude::*;
use std::path::Path;
use std::time::Duration;

pub use connection::{
    CatalogEndpoint, Destination, IngestMode, PostgresDescriptor, SourceRegistry,
    StorageDescriptor, StorageEndpoint, StreamDescriptor, UrlStyle,
};
pub use floe_core::error::ConfigError;

/// Extensions installed when the lake is provisioned, in install order.
pub const DEFAULT_EXTENSIONS: &[&str] = &["ducklake", "postgres", "httpfs", "excel"];

fn default_retry_delay_secs() -> u64 {
    3
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// Retry policy for the destination assessment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentConfig {
    /// Delay between assessment passes in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Give up after this many passes. Unset retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            max_attempts: None,
        }
    }
}

impl AssessmentConfig {
    pub fn backoff(&self) -> FixedBackoff {
        FixedBackoff {
            delay: Duration::from_secs(self.retry_delay_secs),
            max_attempts: self.max_attempts,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Database file for the engine itself. Unset runs in memory.
    #[serde(default)]
    pub path: Option<String>,
    /// Extensions installed during provisioning.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            extensions: default_extensions(),
        }
    }
}

/// Main configuration for floe.
///
/// # Example
///
/// ```yaml
/// source:
///   stream:
///     host: kafka
///     port: 9092
///     topics: [orders]
///     group_id: floe
///     table: orders
///     batch_size: 500
///   storage:
///     s3a:
///       host: minio
///       access_key: ${S3A_KEY}
///       secret: ${S3A_SECRET}
///       scope: bucket1
///   postgres:
///     pgsrc:
///       host: pg
///       username: reader
///       password: ${PGSRC_PASSWORD}
///       database: orders
///
/// destination:
///   catalog:
///     alias: lake
///     host: pg
///     username: lake
///     password: ${LAKE_PASSWORD}
///     database: lake_catalog
///   storage:
///     alias: lake_files
///     host: minio
///     access_key: ${LAKE_KEY}
///     secret: ${LAKE_SECRET}
///     scope: lake
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceRegistry,
    pub destination: Destination,
    #[serde(default)]
    pub assessment: AssessmentConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        ensure!(
            result.is_ok(),
            EnvInterpolationSnafu {
                message: result.errors.join("\n"),
            }
        );

        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks:
    /// - Every alias is a plain identifier
    /// - Hosts, scopes, databases and credentials are not empty
    /// - The stream has topics, a group, a table and a positive batch size
    /// - No two endpoints claim the same alias or secret name
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream = &self.source.stream;
        non_empty("source.stream.host", &stream.host)?;
        non_empty("source.stream.group_id", &stream.group_id)?;
        non_empty("source.stream.table", &stream.table)?;
        ensure!(
            !stream.topics.is_empty() && stream.topics.iter().all(|t| !t.is_empty()),
            EmptyFieldSnafu {
                field: "source.stream.topics"
            }
        );
        ensure!(
            stream.batch_size > 0,
            NotPositiveSnafu {
                field: "source.stream.batch_size"
            }
        );
        ensure!(
            stream.poll_timeout_secs > 0,
            NotPositiveSnafu {
                field: "source.stream.poll_timeout_secs"
            }
        );

        for (alias, storage) in &self.source.storage {
            valid_alias(alias)?;
            validate_storage(&format!("source.storage.{alias}"), storage)?;
        }
        for (alias, postgres) in &self.source.postgres {
            valid_alias(alias)?;
            validate_postgres(&format!("source.postgres.{alias}"), postgres)?;
        }

        let destination = &self.destination;
        valid_alias(&destination.catalog.alias)?;
        validate_postgres("destination.catalog", &destination.catalog.connection)?;
        valid_alias(&destination.storage.alias)?;
        validate_storage("destination.storage", &destination.storage.connection)?;

        if let Some(max) = self.assessment.max_attempts {
            ensure!(
                max > 0,
                NotPositiveSnafu {
                    field: "assessment.max_attempts"
                }
            );
        }

        self.check_conflicts()
    }

    fn check_conflicts(&self) -> Result<(), ConfigError> {
        let destination = &self.destination;
        let claims = self
            .source
            .storage_resources()
            .chain(self.source.postgres_resources())
            .chain([
                (
                    "destination.catalog".to_string(),
                    destination.catalog.resources(),
                ),
                (
                    "destination.storage".to_string(),
                    destination.storage.resources(),
                ),
            ]);

        let conflicts = Resource::conflicts(claims);
        if !conflicts.is_empty() {
            let message = conflicts
                .iter()
                .map(|(resource, keys)| {
                    let mut keys_list: Vec<_> = keys.iter().collect();
                    keys_list.sort();
                    format!("{} claimed by: {:?}", resource, keys_list)
                })
                .collect::<Vec<_>>()
                .join("; ");
            return ResourceConflictSnafu { message }.fail();
        }

        Ok(())
    }

    /// Aliases mounted in the engine once attach completes.
    pub fn attached_aliases(&self) -> Vec<&SourceKey> {
        self.source
            .storage
            .keys()
            .chain(self.source.postgres.keys())
            .chain(std::iter::once(&self.destination.catalog.alias))
            .collect()
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    ensure!(!value.trim().is_empty(), EmptyFieldSnafu { field });
    Ok(())
}

fn valid_alias(alias: &SourceKey) -> Result<(), ConfigError> {
    ensure!(
        is_identifier(alias.id()),
        InvalidAliasSnafu { alias: alias.id() }
    );
    Ok(())
}

fn validate_storage(prefix: &str, storage: &StorageDescriptor) -> Result<(), ConfigError> {
    non_empty(&format!("{prefix}.host"), &storage.host)?;
    non_empty(&format!("{prefix}.scope"), storage.bucket())?;
    non_empty(&format!("{prefix}.access_key"), storage.access_key.expose())?;
    non_empty(&format!("{prefix}.secret"), storage.secret.expose())
}

fn validate_postgres(prefix: &str, postgres: &PostgresDescriptor) -> Result<(), ConfigError> {
    non_empty(&format!("{prefix}.host"), &postgres.host)?;
    non_empty(&format!("{prefix}.database"), &postgres.database)?;
    non_empty(&format!("{prefix}.username"), postgres.username.expose())
}
