//! Configuration primitives shared by the floe crates.

mod key;
mod resource;
mod secret;
mod vars;

pub use key::{SourceKey, is_identifier};
pub use resource::Resource;
pub use secret::Secret;
pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};

use crate::metrics::DEFAULT_METRICS_ADDR;

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to serve the endpoint at all (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    DEFAULT_METRICS_ADDR.to_string()
}
