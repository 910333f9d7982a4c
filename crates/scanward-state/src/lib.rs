//! scanward-state — the authoritative scan model for Scanward.
//!
//! Holds pods, containers, and images in memory together with each image's
//! scan status and the concurrency budget. The [`Model`] is a plain,
//! single-owner structure: it has no interior locking and expects exactly
//! one writer (see `scanward-gateway`).
//!
//! # Architecture
//!
//! ```text
//! Model
//!   ├── pods:   qualified name → Pod
//!   ├── images: sha → ImageInfo (status, assignment, summary)
//!   ├── dispatch   next_image() / finish_scan() / requeue_stalled()
//!   └── results    scan_results() (derived on every call)
//! ```
//!
//! Image status machine:
//!
//! ```text
//! Unknown ──next_image──▶ InProgress ──finish(ok)──▶ Done
//!    ▲                        │ │
//!    └──── requeue_stalled ───┘ └──finish(err)──▶ Error (or Unknown while retries remain)
//! ```

pub mod dispatch;
pub mod error;
pub mod model;
pub mod results;
pub mod types;

pub use dispatch::{epoch_millis, FailedScanPolicy, FinishOutcome};
pub use error::{ModelError, ModelResult};
pub use model::Model;
pub use types::*;
