//! scanward-metrics — observability for the scan control plane.
//!
//! Counts processed gateway operations, scan assignments and outcomes,
//! stalled-scan requeues, and stale completions. Model gauges (images per
//! status, pods, concurrency limit) are refreshed periodically by the
//! gateway's reporter loop.
//!
//! # Architecture
//!
//! ```text
//! ScanMetrics (atomics, shared via Arc)
//!   ├── record_*()        ← called by the gateway writer and the HTTP layer
//!   ├── set_model_stats() ← called by the model-metrics reporter
//!   └── report() → MetricsReport
//!
//! Prometheus exposition
//!   └── render_prometheus(&MetricsReport) → text/plain for /metrics
//! ```

pub mod counters;
pub mod prometheus;

pub use counters::{MetricsReport, OperationKind, ScanMetrics};
pub use prometheus::render_prometheus;
