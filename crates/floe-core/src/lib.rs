//! floe-core: Shared plumbing for the floe lake attacher.
//!
//! This crate contains the functionality that is not specific to any one
//! external system:
//!
//! - `config/` - Alias keys, redacting secrets, resource conflicts and environment variable interpolation
//! - `metrics/` - Internal metric events and the Prometheus endpoint
//! - `retry` - Fixed-backoff retry loop with shutdown awareness
//! - `signal` - Shutdown signals and token cancellation
//! - `tracing` - Subscriber initialization
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod signal;
pub mod tracing;

// Re-export commonly used items
pub use config::{MetricsConfig, Resource, Secret, SourceKey, interpolate};
pub use error::{ConfigError, MetricsError, RetryError};
pub use metrics::{DEFAULT_METRICS_ADDR, init_global as init_metrics};
pub use retry::{FixedBackoff, Retried, retry_with_backoff};
pub use signal::{cancel_on, shutdown_signal, spawn_shutdown_handler};
pub use tracing::init_tracing;
