//! Internal events for floe metrics emission.
//!
//! Each event struct represents a measurable occurrence in the attach sequence
//! or the ingestion loop. Events implement the `InternalEvent` trait which
//! emits the corresponding Prometheus metric.
//!
//! ## Target Labels
//!
//! Ingestion metrics carry a `table` label, attach metrics carry the endpoint
//! `kind` so several sources of the same kind aggregate together.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a retried operation fails and is scheduled again.
pub struct RetryAttempted {
    pub operation: String,
}

impl InternalEvent for RetryAttempted {
    fn emit(self) {
        trace!(operation = %self.operation, "Retry attempted");
        counter!("floe_retries_total", "operation" => self.operation).increment(1);
    }
}

/// Outcome of mounting one endpoint into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStatus {
    Attached,
    Failed,
}

impl AttachStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachStatus::Attached => "attached",
            AttachStatus::Failed => "failed",
        }
    }
}

/// Event emitted once per secret registration or attach of an endpoint.
pub struct EndpointAttached {
    /// Endpoint kind (e.g. "object_storage", "postgres", "catalog").
    pub kind: &'static str,
    pub status: AttachStatus,
}

impl InternalEvent for EndpointAttached {
    fn emit(self) {
        trace!(kind = self.kind, status = self.status.as_str(), "Endpoint attached");
        counter!("floe_endpoint_attach_total", "kind" => self.kind, "status" => self.status.as_str())
            .increment(1);
    }
}

/// Event emitted when the catalog had to be provisioned.
pub struct CatalogProvisioned {
    pub alias: String,
}

impl InternalEvent for CatalogProvisioned {
    fn emit(self) {
        trace!(alias = %self.alias, "Catalog provisioned");
        counter!("floe_catalog_provisioned_total", "alias" => self.alias).increment(1);
    }
}

/// Event emitted when an engine extension is installed and loaded.
pub struct ExtensionLoaded {
    pub extension: String,
}

impl InternalEvent for ExtensionLoaded {
    fn emit(self) {
        trace!(extension = %self.extension, "Extension loaded");
        counter!("floe_extensions_loaded_total", "extension" => self.extension).increment(1);
    }
}

/// Event emitted for every poll that returned deliveries.
pub struct DeliveriesReceived {
    pub count: u64,
    pub table: String,
}

impl InternalEvent for DeliveriesReceived {
    fn emit(self) {
        trace!(count = self.count, table = %self.table, "Deliveries received");
        counter!("floe_deliveries_received_total", "table" => self.table).increment(self.count);
    }
}

/// Reason a record never reached the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The broker reported an error for the delivery.
    Broker,
    /// The payload was not a JSON object.
    Decode,
    /// The batch was below the low-water mark.
    BelowLowWater,
    /// The insert statement failed.
    InsertFailed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Broker => "broker",
            DropReason::Decode => "decode",
            DropReason::BelowLowWater => "below_low_water",
            DropReason::InsertFailed => "insert_failed",
        }
    }
}

/// Event emitted when records are dropped.
pub struct RecordsDropped {
    pub count: u64,
    pub reason: DropReason,
    pub table: String,
}

impl InternalEvent for RecordsDropped {
    fn emit(self) {
        trace!(count = self.count, reason = self.reason.as_str(), table = %self.table, "Records dropped");
        counter!("floe_records_dropped_total", "reason" => self.reason.as_str(), "table" => self.table)
            .increment(self.count);
    }
}

/// Event emitted when a batch is inserted into the lake.
pub struct BatchInserted {
    pub rows: u64,
    pub table: String,
}

impl InternalEvent for BatchInserted {
    fn emit(self) {
        trace!(rows = self.rows, table = %self.table, "Batch inserted");
        counter!("floe_batches_inserted_total", "table" => self.table.clone()).increment(1);
        counter!("floe_rows_inserted_total", "table" => self.table).increment(self.rows);
    }
}

/// Event emitted with the wall time of an insert statement.
pub struct InsertDuration {
    pub duration: Duration,
    pub table: String,
}

impl InternalEvent for InsertDuration {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis() as u64, table = %self.table, "Insert duration");
        histogram!("floe_insert_duration_seconds", "table" => self.table)
            .record(self.duration.as_secs_f64());
    }
}
