//! Scan metrics — lock-free counters and gauges.
//!
//! Every field is an atomic so the writer loop, HTTP handlers, and the
//! reporter can record concurrently without coordination.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use scanward_state::{ModelStats, StatusCounts};

/// Gateway operations, used as the `operation` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    AddPod,
    UpdatePod,
    DeletePod,
    AddImage,
    ReplaceAllPods,
    ReplaceAllImages,
    NextImage,
    FinishScan,
    SetConcurrencyLimit,
    ScanResults,
    Snapshot,
    Stats,
    RequeueStalled,
}

impl OperationKind {
    pub const ALL: [OperationKind; 13] = [
        OperationKind::AddPod,
        OperationKind::UpdatePod,
        OperationKind::DeletePod,
        OperationKind::AddImage,
        OperationKind::ReplaceAllPods,
        OperationKind::ReplaceAllImages,
        OperationKind::NextImage,
        OperationKind::FinishScan,
        OperationKind::SetConcurrencyLimit,
        OperationKind::ScanResults,
        OperationKind::Snapshot,
        OperationKind::Stats,
        OperationKind::RequeueStalled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddPod => "add_pod",
            OperationKind::UpdatePod => "update_pod",
            OperationKind::DeletePod => "delete_pod",
            OperationKind::AddImage => "add_image",
            OperationKind::ReplaceAllPods => "replace_all_pods",
            OperationKind::ReplaceAllImages => "replace_all_images",
            OperationKind::NextImage => "next_image",
            OperationKind::FinishScan => "finish_scan",
            OperationKind::SetConcurrencyLimit => "set_concurrency_limit",
            OperationKind::ScanResults => "scan_results",
            OperationKind::Snapshot => "snapshot",
            OperationKind::Stats => "stats",
            OperationKind::RequeueStalled => "requeue_stalled",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Shared counters for the whole process.
#[derive(Debug)]
pub struct ScanMetrics {
    operations: [AtomicU64; OperationKind::ALL.len()],
    scans_assigned: AtomicU64,
    scans_done: AtomicU64,
    scans_failed: AtomicU64,
    scan_retries: AtomicU64,
    stalled_scans: AtomicU64,
    stale_completions: AtomicU64,
    rejected_requests: AtomicU64,
    // Gauges, last value reported by the model.
    images_unknown: AtomicU64,
    images_in_progress: AtomicU64,
    images_done: AtomicU64,
    images_error: AtomicU64,
    pods: AtomicU64,
    concurrency_limit: AtomicU64,
}

/// Point-in-time copy of every counter and gauge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsReport {
    pub operations: Vec<(OperationKind, u64)>,
    pub scans_assigned: u64,
    pub scans_done: u64,
    pub scans_failed: u64,
    pub scan_retries: u64,
    pub stalled_scans: u64,
    pub stale_completions: u64,
    pub rejected_requests: u64,
    pub model: ModelStats,
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            operations: std::array::from_fn(|_| AtomicU64::new(0)),
            scans_assigned: AtomicU64::new(0),
            scans_done: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            scan_retries: AtomicU64::new(0),
            stalled_scans: AtomicU64::new(0),
            stale_completions: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            images_unknown: AtomicU64::new(0),
            images_in_progress: AtomicU64::new(0),
            images_done: AtomicU64::new(0),
            images_error: AtomicU64::new(0),
            pods: AtomicU64::new(0),
            concurrency_limit: AtomicU64::new(0),
        }
    }

    pub fn record_operation(&self, op: OperationKind) {
        self.operations[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assignment(&self) {
        self.scans_assigned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_done(&self) {
        self.scans_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_retry(&self) {
        self.scan_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stalled_scans(&self, count: usize) {
        self.stalled_scans
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_stale_completion(&self) {
        self.stale_completions.fetch_add(1, Ordering::Relaxed);
    }

    /// A request rejected with a 4xx.
    pub fn record_rejected_request(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrite the model gauges.
    pub fn set_model_stats(&self, stats: &ModelStats) {
        self.images_unknown
            .store(stats.images.unknown as u64, Ordering::Relaxed);
        self.images_in_progress
            .store(stats.images.in_progress as u64, Ordering::Relaxed);
        self.images_done
            .store(stats.images.done as u64, Ordering::Relaxed);
        self.images_error
            .store(stats.images.error as u64, Ordering::Relaxed);
        self.pods.store(stats.pods as u64, Ordering::Relaxed);
        self.concurrency_limit
            .store(stats.concurrency_limit as u64, Ordering::Relaxed);
        debug!(
            pods = stats.pods,
            unknown = stats.images.unknown,
            in_progress = stats.images.in_progress,
            done = stats.images.done,
            error = stats.images.error,
            limit = stats.concurrency_limit,
            "model gauges updated"
        );
    }

    pub fn operation_count(&self, op: OperationKind) -> u64 {
        self.operations[op.index()].load(Ordering::Relaxed)
    }

    pub fn stalled_scans(&self) -> u64 {
        self.stalled_scans.load(Ordering::Relaxed)
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale_completions.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            operations: OperationKind::ALL
                .iter()
                .map(|op| (*op, self.operation_count(*op)))
                .collect(),
            scans_assigned: self.scans_assigned.load(Ordering::Relaxed),
            scans_done: self.scans_done.load(Ordering::Relaxed),
            scans_failed: self.scans_failed.load(Ordering::Relaxed),
            scan_retries: self.scan_retries.load(Ordering::Relaxed),
            stalled_scans: self.stalled_scans(),
            stale_completions: self.stale_completions(),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            model: ModelStats {
                images: StatusCounts {
                    unknown: self.images_unknown.load(Ordering::Relaxed) as usize,
                    in_progress: self.images_in_progress.load(Ordering::Relaxed) as usize,
                    done: self.images_done.load(Ordering::Relaxed) as usize,
                    error: self.images_error.load(Ordering::Relaxed) as usize,
                },
                pods: self.pods.load(Ordering::Relaxed) as usize,
                concurrency_limit: self.concurrency_limit.load(Ordering::Relaxed) as usize,
            },
        }
    }
}
