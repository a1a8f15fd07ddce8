//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

pub use server::{DEFAULT_METRICS_ADDR, init_global};

/// Macro for emitting metric events.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric. Without an installed
/// recorder the call is a no-op, which keeps tests free of setup.
///
/// # Example
///
/// ```ignore
/// use floe_core::metrics::events::BatchInserted;
///
/// emit!(BatchInserted { rows: 100, table: "events".to_string() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
