//! Floe: Attaches a DuckLake lakehouse to object storage, Postgres and Kafka.
//!
//! This crate handles:
//! - Describing every endpoint and validating the configuration
//! - Provisioning the destination bucket and catalog database when missing
//! - Registering secrets and attaching sources into one DuckDB session
//! - Inferring a table from the first stream record and ingesting in batches
//! - Reading tables as they were before a recorded change

pub mod app;
pub mod assess;
pub mod attach;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod plan;
pub mod snapshot;
pub mod stream;

// Re-export commonly used items
pub use app::{run_attach, run_query, run_snapshots};
pub use attach::{AttachReport, AttachState, AttachedSession, Orchestrator};
pub use cli::{CliArgs, Command};
pub use config::Config;
pub use engine::{DuckDbEngine, Engine, EngineSession};
pub use error::LakeError;

// Re-export from floe-core
pub use floe_core::{
    MetricsConfig, SourceKey, cancel_on, init_metrics, init_tracing, shutdown_signal,
    spawn_shutdown_handler,
};
