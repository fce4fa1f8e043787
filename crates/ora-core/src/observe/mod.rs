//! # Observability Stack
//!
//! - **Logging**: structured logs via `tracing`
//! - **Metrics**: Prometheus-compatible counters and gauges for the control loop
//! - **Records**: per-trigger and per-tick CSV records on a dedicated target
//!
//! ```text
//!   sampler / reasoner / actuator
//!     │ tracing::info!()   │ metrics.fires.inc()   │ record.emit()
//!     ▼                    ▼                       ▼
//! ┌─────────┐        ┌──────────┐          ┌─────────────┐
//! │ Logging │        │ Metrics  │          │ ora::record │
//! └─────────┘        └──────────┘          └─────────────┘
//! ```

pub mod logging;
pub mod metrics;
pub mod record;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use metrics::{ControlMetrics, Counter, Gauge, Histogram, MetricsSnapshot};
pub use record::{now_millis, StatusRecord, TriggerRecord, RECORD_TARGET};

use std::sync::Arc;

/// Install logging and create a shared metrics instance.
pub fn init(log_config: &LogConfig) -> Arc<ControlMetrics> {
    init_logging(log_config);
    Arc::new(ControlMetrics::new())
}
