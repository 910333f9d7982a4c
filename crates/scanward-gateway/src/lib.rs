//! scanward-gateway — serialized access to the scan model.
//!
//! Any number of callers (HTTP handlers, the stalled-scan monitor, the
//! metrics reporter) submit operations to one ordered queue. A single
//! writer task owns the [`scanward_state::Model`] and applies them one at
//! a time, replying over a oneshot channel. No locks guard the model.
//!
//! # Architecture
//!
//! ```text
//! Gateway (Clone) ──mpsc──▶ ModelWriter task ──owns──▶ Model
//!    ▲  ▲                        │
//!    │  └── oneshot reply ◀──────┘
//!    │
//!    ├── StalledScanMonitor   (periodic requeue_stalled)
//!    └── ModelMetricsReporter (periodic stats → gauges)
//! ```
//!
//! Callers that give up waiting (e.g. an HTTP timeout) simply drop their
//! reply receiver; the writer still applies the operation.

pub mod error;
pub mod gateway;
pub mod monitor;
pub mod reporter;

pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use monitor::StalledScanMonitor;
pub use reporter::ModelMetricsReporter;
