//! Connection descriptors for the endpoints the lake talks to.
//!
//! Descriptors are plain values: they are read once from configuration and
//! only ever consulted for addresses and credentials afterwards.

use floe_core::{Resource, Secret, SourceKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_storage_port() -> u16 {
    9000
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_broker_port() -> u16 {
    9092
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_rewind_on_assign() -> bool {
    true
}

/// Addressing style for bucket URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStyle {
    /// `http://host:port/bucket`
    #[default]
    Path,
    /// `http://bucket.host:port`
    #[serde(alias = "vhs")]
    Vhost,
}

impl UrlStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStyle::Path => "path",
            UrlStyle::Vhost => "vhost",
        }
    }
}

/// An S3-compatible object store and the scope (bucket, optionally with a
/// prefix) the lake may use on it.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageDescriptor {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_storage_port")]
    pub port: u16,
    pub access_key: Secret,
    pub secret: Secret,
    /// Bucket name, optionally followed by `/prefix`.
    pub scope: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Use TLS when talking to the endpoint.
    #[serde(default)]
    pub secure: bool,
    #[serde(default, alias = "style")]
    pub url_style: UrlStyle,
}

impl StorageDescriptor {
    fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// `host:port`, as the engine expects it in secrets.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full endpoint address including the scheme.
    ///
    /// ```
    /// # use floe::config::StorageDescriptor;
    /// # let yaml = "{host: minio, port: 9000, access_key: k, secret: s, scope: bucket1}";
    /// let storage: StorageDescriptor = serde_yaml::from_str(yaml).unwrap();
    /// assert_eq!(storage.address(), "http://minio:9000");
    /// ```
    pub fn address(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// Bucket part of the scope.
    pub fn bucket(&self) -> &str {
        let scope = self.scope.trim_matches('/');
        scope.split_once('/').map_or(scope, |(bucket, _)| bucket)
    }

    /// `s3://` URL of the scope.
    pub fn scope_url(&self) -> String {
        format!("s3://{}", self.scope.trim_matches('/'))
    }

    /// Bucket URL on this endpoint in the configured addressing style.
    pub fn bucket_url(&self) -> String {
        match self.url_style {
            UrlStyle::Path => format!("{}/{}", self.address(), self.bucket()),
            UrlStyle::Vhost => format!(
                "{}://{}.{}:{}",
                self.scheme(),
                self.bucket(),
                self.host,
                self.port
            ),
        }
    }
}

/// A Postgres server and the database used on it.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresDescriptor {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub username: Secret,
    pub password: Secret,
    #[serde(default = "default_database")]
    pub database: String,
}

impl PostgresDescriptor {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// libpq style connection string for `database` on this server.
    ///
    /// Values are single-quoted so spaces and quotes in credentials survive.
    pub fn connection_string(&self, database: &str) -> Secret {
        Secret::new(format!(
            "host={} port={} dbname={} user={} password={}",
            libpq_value(&self.host),
            self.port,
            libpq_value(database),
            libpq_value(self.username.expose()),
            libpq_value(self.password.expose())
        ))
    }
}

fn libpq_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl fmt::Display for PostgresDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgresql://{}:{}/{}", self.host, self.port, self.database)
    }
}

/// How records are written once the stream is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// One insert per polled batch.
    #[default]
    Batch,
    /// One insert and commit per message.
    Single,
}

/// A Kafka broker, what to read from it and where it lands.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamDescriptor {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(alias = "ingest_topics")]
    pub topics: Vec<String>,
    pub group_id: String,
    /// Target table inside the lake catalog.
    #[serde(alias = "ingest_table")]
    pub table: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default)]
    pub mode: IngestMode,
    /// Rewind every assigned partition to its first offset.
    #[serde(default = "default_rewind_on_assign")]
    pub rewind_on_assign: bool,
    /// Extra librdkafka properties, applied last.
    #[serde(default)]
    pub properties: IndexMap<String, String>,
}

impl StreamDescriptor {
    /// Bootstrap server address.
    pub fn broker_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_timeout_secs)
    }
}

/// The lake catalog: a Postgres database holding the table metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    #[serde(alias = "lake_alias")]
    pub alias: SourceKey,
    #[serde(flatten)]
    pub connection: PostgresDescriptor,
}

impl CatalogEndpoint {
    /// Name of the secret holding the catalog credentials.
    pub fn secret_name(&self) -> String {
        self.alias.secret_name(Some("secret"))
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::alias(self.alias.id()),
            Resource::secret(&self.secret_name()),
        ]
    }
}

/// The object store the lake writes its data files to.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageEndpoint {
    #[serde(alias = "lake_alias")]
    pub alias: SourceKey,
    #[serde(flatten)]
    pub connection: StorageDescriptor,
}

impl StorageEndpoint {
    /// The destination storage secret is named after its alias.
    pub fn secret_name(&self) -> String {
        self.alias.secret_name(None)
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![Resource::secret(&self.secret_name())]
    }
}

/// Where the lake lives.
#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    pub catalog: CatalogEndpoint,
    pub storage: StorageEndpoint,
}

/// Every endpoint the lake reads from, keyed by alias.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub stream: StreamDescriptor,
    #[serde(default)]
    pub storage: IndexMap<SourceKey, StorageDescriptor>,
    #[serde(default)]
    pub postgres: IndexMap<SourceKey, PostgresDescriptor>,
}

impl SourceRegistry {
    /// Resources claimed by the object storage sources.
    ///
    /// Object storage sources only register a secret, nothing is attached.
    pub fn storage_resources(&self) -> impl Iterator<Item = (String, Vec<Resource>)> + '_ {
        self.storage.keys().map(|alias| {
            (
                format!("source.storage.{alias}"),
                vec![Resource::secret(&alias.secret_name(Some("secret")))],
            )
        })
    }

    /// Resources claimed by the Postgres sources.
    pub fn postgres_resources(&self) -> impl Iterator<Item = (String, Vec<Resource>)> + '_ {
        self.postgres.keys().map(|alias| {
            (
                format!("source.postgres.{alias}"),
                vec![
                    Resource::alias(alias.id()),
                    Resource::secret(&alias.secret_name(Some("secret"))),
                ],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(yaml: &str) -> StorageDescriptor {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_storage_defaults() {
        let s = storage("{access_key: k, secret: s, scope: bucket1}");
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 9000);
        assert_eq!(s.region, "us-east-1");
        assert!(!s.secure);
        assert_eq!(s.url_style, UrlStyle::Path);
    }

    #[test]
    fn test_storage_addresses() {
        let s = storage("{host: minio, port: 9000, access_key: k, secret: s, scope: bucket1}");
        assert_eq!(s.endpoint(), "minio:9000");
        assert_eq!(s.address(), "http://minio:9000");
        assert_eq!(s.bucket_url(), "http://minio:9000/bucket1");
        assert_eq!(s.scope_url(), "s3://bucket1");

        let s = storage(
            "{host: minio, port: 443, access_key: k, secret: s, scope: bucket1, secure: true, url_style: vhs}",
        );
        assert_eq!(s.address(), "https://minio:443");
        assert_eq!(s.bucket_url(), "https://bucket1.minio:443");
    }

    #[test]
    fn test_scope_with_prefix() {
        let s = storage("{access_key: k, secret: s, scope: /bucket1/lake/}");
        assert_eq!(s.bucket(), "bucket1");
        assert_eq!(s.scope_url(), "s3://bucket1/lake");
    }

    #[test]
    fn test_postgres_connection_string_redacted() {
        let pg: PostgresDescriptor =
            serde_yaml::from_str("{host: db, username: lake, password: hunter2, database: orders}")
                .unwrap();

        assert_eq!(pg.port, 5432);
        assert_eq!(pg.to_string(), "postgresql://db:5432/orders");

        let dsn = pg.connection_string("postgres");
        assert_eq!(
            dsn.expose(),
            "host='db' port=5432 dbname='postgres' user='lake' password='hunter2'"
        );
        assert!(!format!("{pg:?} {dsn} {dsn:?}").contains("hunter2"));
    }

    #[test]
    fn test_connection_string_quotes_values() {
        let pg: PostgresDescriptor =
            serde_yaml::from_str(r#"{host: db, username: lake, password: "it's a\\pw", database: orders}"#)
                .unwrap();

        assert_eq!(
            pg.connection_string("orders").expose(),
            r"host='db' port=5432 dbname='orders' user='lake' password='it\'s a\\pw'"
        );
    }

    #[test]
    fn test_stream_defaults() {
        let stream: StreamDescriptor = serde_yaml::from_str(
            "{host: kafka, ingest_topics: [events], group_id: g1, ingest_table: events}",
        )
        .unwrap();

        assert_eq!(stream.broker_url(), "kafka:9092");
        assert_eq!(stream.topics, vec!["events"]);
        assert_eq!(stream.batch_size, 1000);
        assert_eq!(stream.mode, IngestMode::Batch);
        assert!(stream.rewind_on_assign);
        assert!(stream.properties.is_empty());
    }

    #[test]
    fn test_catalog_endpoint_flattened() {
        let catalog: CatalogEndpoint = serde_yaml::from_str(
            "{alias: lake, host: pg, port: 5433, username: u, password: p, database: lakedb}",
        )
        .unwrap();

        assert_eq!(catalog.alias.id(), "lake");
        assert_eq!(catalog.connection.port, 5433);
        assert_eq!(catalog.secret_name(), "lake_secret");
    }
}
