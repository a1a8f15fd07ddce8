//! Error types for the floe lake attacher.

use snafu::prelude::*;

// Re-export common errors
pub use floe_core::error::{ConfigError, MetricsError, RetryError};

/// Boxed error used at the seams where more than one client implementation exists.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while probing or provisioning the destination.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AssessError {
    /// The object store could not be reached or refused the request.
    #[snafu(display("Object storage request for bucket '{bucket}' failed: {source}"))]
    ObjectStorage { bucket: String, source: BoxError },

    /// Connecting to the administrative database failed.
    #[snafu(display("Failed to connect to catalog server {address}: {source}"))]
    CatalogConnect { address: String, source: BoxError },

    /// Querying or creating the catalog database failed.
    #[snafu(display("Catalog database '{database}' request failed: {source}"))]
    CatalogDatabase { database: String, source: BoxError },
}

/// Errors raised while building a statement for an endpoint.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PlanError {
    /// The alias cannot be used as an engine identifier.
    #[snafu(display("Alias '{alias}' is not a valid identifier"))]
    InvalidIdentifier { alias: String },

    /// A field needed by the statement is empty.
    #[snafu(display("'{field}' is empty for '{alias}'"))]
    MissingField { alias: String, field: &'static str },
}

/// Errors raised by the analytical engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// Opening the engine failed.
    #[snafu(display("Failed to open engine: {source}"))]
    Open { source: BoxError },

    /// A statement failed to execute.
    #[snafu(display("Statement failed: {source}\n  {statement}"))]
    Execute { statement: String, source: BoxError },

    /// An insert into a table failed.
    #[snafu(display("Insert into {table} failed: {source}"))]
    Insert { table: String, source: BoxError },

    /// Registering a secret failed. `reason` has its credentials redacted.
    #[snafu(display("Failed to register secret '{name}': {reason}"))]
    RegisterSecret { name: String, reason: String },
}

/// Errors that end the attach sequence.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AttachError {
    /// The destination never became ready.
    #[snafu(display("Destination assessment did not complete: {source}"))]
    Assess { source: RetryError<AssessError> },

    /// A required engine extension could not be installed or loaded.
    #[snafu(display("Failed to install extension '{extension}': {source}"))]
    Extension {
        extension: String,
        source: EngineError,
    },

    /// An extension name is not a plain identifier.
    #[snafu(display("Invalid extension name '{extension}': {source}"))]
    ExtensionName {
        extension: String,
        source: PlanError,
    },

    /// The catalog could not be attached even after provisioning.
    #[snafu(display("Catalog '{alias}' could not be attached after provisioning: {source}"))]
    CatalogUnavailable { alias: String, source: EngineError },

    /// The catalog statement itself could not be built.
    #[snafu(display("Catalog '{alias}' is misconfigured: {source}"))]
    CatalogPlan { alias: String, source: PlanError },

    /// Selecting the catalog as the default database failed.
    #[snafu(display("Failed to select catalog '{alias}': {source}"))]
    UseCatalog { alias: String, source: EngineError },
}

/// Errors raised by the stream consumer and ingestion loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StreamError {
    /// Creating a broker consumer failed.
    #[snafu(display("Failed to create consumer for group '{group}': {source}"))]
    CreateConsumer { group: String, source: BoxError },

    /// Subscribing to the topics failed.
    #[snafu(display("Failed to subscribe to {topics:?}: {source}"))]
    Subscribe {
        topics: Vec<String>,
        source: BoxError,
    },

    /// A consumer for this group is already open.
    #[snafu(display("Consumer group '{group}' is already open"))]
    GroupAlreadyOpen { group: String },

    /// Committing offsets failed.
    #[snafu(display("Failed to commit offsets: {source}"))]
    Commit { source: BoxError },

    /// The payload was not valid JSON.
    #[snafu(display("Failed to decode payload: {source}"))]
    Decode { source: serde_json::Error },

    /// The payload was valid JSON but not an object.
    #[snafu(display("Expected a JSON object, got {kind}"))]
    NotAnObject { kind: &'static str },

    /// The message carried no payload.
    #[snafu(display("Message has no payload"))]
    EmptyPayload,

    /// Creating the target table failed.
    #[snafu(display("Failed to create table '{table}': {source}"))]
    CreateTable { table: String, source: EngineError },

    /// Shutdown arrived before a sample record did.
    #[snafu(display("Schema inference for '{table}' cancelled before a sample arrived"))]
    InferenceCancelled { table: String },
}

/// Errors raised while inspecting the snapshot history.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SnapshotError {
    /// Listing the catalog's snapshots failed.
    #[snafu(display("Failed to list snapshots of '{catalog}': {source}"))]
    ListSnapshots { catalog: String, source: EngineError },

    /// A snapshot id was not an integer.
    #[snafu(display("Unexpected snapshot id '{value}'"))]
    SnapshotId { value: String },

    /// Reading the table at an earlier snapshot failed.
    #[snafu(display("Failed to read '{table}' at snapshot {version}: {source}"))]
    TimeTravel {
        table: String,
        version: i64,
        source: EngineError,
    },
}

/// Top-level errors surfaced by the binary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LakeError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// Engine error.
    #[snafu(display("Engine error: {source}"))]
    Engine { source: EngineError },

    /// Attach error.
    #[snafu(display("Attach error: {source}"))]
    Attach { source: AttachError },

    /// Stream error.
    #[snafu(display("Stream error: {source}"))]
    Stream { source: StreamError },

    /// Snapshot error.
    #[snafu(display("Snapshot error: {source}"))]
    Snapshot { source: SnapshotError },

    /// Building an object storage or catalog client failed.
    #[snafu(display("Client setup error: {source}"))]
    Client { source: AssessError },
}

impl From<ConfigError> for LakeError {
    fn from(source: ConfigError) -> Self {
        LakeError::Config { source }
    }
}

impl From<MetricsError> for LakeError {
    fn from(source: MetricsError) -> Self {
        LakeError::Metrics { source }
    }
}

impl From<EngineError> for LakeError {
    fn from(source: EngineError) -> Self {
        LakeError::Engine { source }
    }
}

impl From<AttachError> for LakeError {
    fn from(source: AttachError) -> Self {
        LakeError::Attach { source }
    }
}

impl From<StreamError> for LakeError {
    fn from(source: StreamError) -> Self {
        LakeError::Stream { source }
    }
}

impl From<SnapshotError> for LakeError {
    fn from(source: SnapshotError) -> Self {
        LakeError::Snapshot { source }
    }
}

impl From<AssessError> for LakeError {
    fn from(source: AssessError) -> Self {
        LakeError::Client { source }
    }
}
