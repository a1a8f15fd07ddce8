//! Streaming ingestion from the broker into the lake.
//!
//! - `consumer`: the consumer seam and the set of open consumers
//! - `kafka`: rdkafka implementation with rewind-on-assign
//! - `record`: payload decoding, flattening and insert building
//! - `schema`: target table inference from a sample record
//! - `ingest`: batch and single-record loops

pub mod consumer;
pub mod ingest;
pub mod kafka;
pub mod record;
pub mod schema;

pub use consumer::{ConsumerFactory, ConsumerSet, Delivery, MessageSource};
pub use ingest::{IngestOptions, IngestStats, MIN_BATCH_RECORDS, ingest, run_batches, run_single};
pub use kafka::KafkaConsumerFactory;
pub use schema::{ColumnType, InferredSchema, ValueKind, infer_and_create};
