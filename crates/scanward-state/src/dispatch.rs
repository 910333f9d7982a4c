//! Scan dispatch — assigning images to workers and recording their outcome.
//!
//! Selection and the `Unknown → InProgress` transition happen inside one
//! `&mut Model` call, so an image can never be handed out twice while it
//! is in flight.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ModelError, ModelResult};
use crate::model::Model;
use crate::types::*;

/// What happens to an image whose scan fails.
///
/// Each failure bumps the image's `failed_attempts`. While that count is
/// within `max_retries` the image returns to `Unknown`; after that it
/// settles in `Error`. The default of zero never retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedScanPolicy {
    pub max_retries: u32,
}

/// Result of applying a worker's completion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Done,
    Failed,
    /// Failed, but sent back to `Unknown` for another attempt.
    Retrying { attempt: u32 },
    /// The image was not `InProgress` (e.g. already requeued as stalled).
    /// Nothing was changed.
    Stale { status: ScanStatus },
}

impl Model {
    /// Pick the next image to scan and mark it `InProgress`.
    ///
    /// Returns `None` when the budget is used up or nothing is `Unknown`.
    pub fn next_image(&mut self, now_ms: u64, worker: Option<&str>) -> Option<ImageSpec> {
        let in_progress = self.in_progress_count();
        if in_progress >= self.concurrency_limit {
            debug!(
                in_progress,
                limit = self.concurrency_limit,
                "concurrency budget exhausted"
            );
            return None;
        }

        let sha = self
            .images
            .values()
            .filter(|i| i.status == ScanStatus::Unknown)
            .min_by_key(|i| dispatch_key(i))?
            .image
            .sha
            .clone();

        let info = self.images.get_mut(&sha)?;
        info.status = ScanStatus::InProgress;
        info.assigned_at_ms = Some(now_ms);
        info.assigned_to = worker.map(str::to_string);
        Some(ImageSpec::from(&info.image))
    }

    /// Apply a worker's completion report.
    ///
    /// An unknown digest is `NotFound`; a digest that is not in flight is a
    /// [`FinishOutcome::Stale`] no-op.
    pub fn finish_scan(&mut self, job: &FinishedScan) -> ModelResult<FinishOutcome> {
        let policy = self.failed_scan_policy;
        let info = self
            .images
            .get_mut(&job.digest)
            .ok_or_else(|| ModelError::NotFound(format!("image {}", job.digest)))?;

        if info.status != ScanStatus::InProgress {
            return Ok(FinishOutcome::Stale {
                status: info.status,
            });
        }

        info.assigned_at_ms = None;
        info.assigned_to = None;

        if job.success {
            info.status = ScanStatus::Done;
            info.summary = job.summary.clone();
            info.last_error = None;
            return Ok(FinishOutcome::Done);
        }

        info.failed_attempts += 1;
        info.last_error = job.error_message.clone();
        if info.failed_attempts <= policy.max_retries {
            info.status = ScanStatus::Unknown;
            info!(
                image = %info.image.human_readable_name(),
                attempt = info.failed_attempts,
                max_retries = policy.max_retries,
                "scan failed, requeueing"
            );
            Ok(FinishOutcome::Retrying {
                attempt: info.failed_attempts,
            })
        } else {
            info.status = ScanStatus::Error;
            Ok(FinishOutcome::Failed)
        }
    }

    /// Digests whose assignment is at least `timeout` old, sorted.
    pub fn stalled_scans(&self, now_ms: u64, timeout: Duration) -> Vec<Sha> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let mut stalled: Vec<Sha> = self
            .images
            .values()
            .filter(|i| i.status == ScanStatus::InProgress)
            .filter(|i| {
                i.assigned_at_ms
                    .is_some_and(|at| now_ms.saturating_sub(at) >= timeout_ms)
            })
            .map(|i| i.image.sha.clone())
            .collect();
        stalled.sort();
        stalled
    }

    /// Force every stalled scan back to `Unknown`, discarding its assignment.
    pub fn requeue_stalled(&mut self, now_ms: u64, timeout: Duration) -> Vec<Sha> {
        let stalled = self.stalled_scans(now_ms, timeout);
        for sha in &stalled {
            if let Some(info) = self.images.get_mut(sha) {
                warn!(
                    image = %info.image.human_readable_name(),
                    worker = info.assigned_to.as_deref().unwrap_or("-"),
                    assigned_at_ms = info.assigned_at_ms.unwrap_or_default(),
                    "stalled scan requeued"
                );
                info.status = ScanStatus::Unknown;
                info.assigned_at_ms = None;
                info.assigned_to = None;
            }
        }
        stalled
    }
}

/// Explicit priorities first (ascending), then discovery order.
fn dispatch_key(info: &ImageInfo) -> (bool, i32, u64) {
    (
        info.image.priority.is_none(),
        info.image.priority.unwrap_or_default(),
        info.discovered_seq,
    )
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{assert_references_resolve, image, pod};

    const HOUR_MS: u64 = 60 * 60 * 1000;

    fn finished(sha: &str, success: bool) -> FinishedScan {
        FinishedScan {
            digest: sha.to_string(),
            success,
            error_message: (!success).then(|| "scan client exited 1".to_string()),
            summary: None,
        }
    }

    #[test]
    fn next_image_marks_in_progress() {
        let mut model = Model::new(2);
        model.add_pod(pod("ns", "p1", &["sha:aaa"])).unwrap();

        let spec = model.next_image(1000, Some("worker-1")).unwrap();
        assert_eq!(spec.sha, "sha:aaa");
        assert_eq!(spec.pull_spec, "registry.local/repo@sha:aaa");

        let info = model.image("sha:aaa").unwrap();
        assert_eq!(info.status, ScanStatus::InProgress);
        assert_eq!(info.assigned_at_ms, Some(1000));
        assert_eq!(info.assigned_to.as_deref(), Some("worker-1"));
    }

    #[test]
    fn next_image_never_repeats_in_flight_digest() {
        let mut model = Model::new(10);
        model.add_pod(pod("ns", "p1", &["sha:aaa", "sha:bbb"])).unwrap();

        let first = model.next_image(0, None).unwrap();
        let second = model.next_image(0, None).unwrap();
        assert_ne!(first.sha, second.sha);
        assert!(model.next_image(0, None).is_none());
    }

    #[test]
    fn budget_of_one_blocks_second_assignment() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "p1", &["sha:aaa", "sha:bbb"])).unwrap();

        let first = model.next_image(0, None).unwrap();
        assert!(model.next_image(0, None).is_none());

        model.finish_scan(&finished(&first.sha, true)).unwrap();
        let second = model.next_image(0, None).unwrap();
        assert_ne!(first.sha, second.sha);
    }

    #[test]
    fn zero_budget_assigns_nothing() {
        let mut model = Model::new(0);
        model.add_image(image("sha:aaa")).unwrap();
        assert!(model.next_image(0, None).is_none());
        assert_eq!(model.image("sha:aaa").unwrap().status, ScanStatus::Unknown);
    }

    #[test]
    fn priority_then_discovery_order() {
        let mut model = Model::new(10);
        model.add_image(image("sha:first")).unwrap();
        let mut low = image("sha:low");
        low.priority = Some(5);
        model.add_image(low).unwrap();
        let mut urgent = image("sha:urgent");
        urgent.priority = Some(-1);
        model.add_image(urgent).unwrap();
        model.add_image(image("sha:last")).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| model.next_image(0, None))
            .map(|s| s.sha)
            .collect();
        assert_eq!(order, vec!["sha:urgent", "sha:low", "sha:first", "sha:last"]);
    }

    #[test]
    fn lowering_budget_does_not_interrupt() {
        let mut model = Model::new(3);
        model
            .add_pod(pod("ns", "p1", &["sha:a", "sha:b", "sha:c", "sha:d"]))
            .unwrap();
        for _ in 0..3 {
            model.next_image(0, None).unwrap();
        }

        model.set_concurrency_limit(1).unwrap();
        assert_eq!(model.in_progress_count(), 3);
        assert!(model.next_image(0, None).is_none());

        let in_flight: Vec<String> = model.stalled_scans(0, Duration::ZERO);
        model.finish_scan(&finished(&in_flight[0], true)).unwrap();
        model.finish_scan(&finished(&in_flight[1], true)).unwrap();
        assert!(model.next_image(0, None).is_none());

        model.finish_scan(&finished(&in_flight[2], true)).unwrap();
        assert!(model.next_image(0, None).is_some());
    }

    #[test]
    fn finish_success_records_summary() {
        let mut model = Model::new(1);
        model.add_image(image("sha:aaa")).unwrap();
        model.next_image(0, Some("w")).unwrap();

        let mut job = finished("sha:aaa", true);
        job.summary = Some(ScanSummary {
            vulnerabilities: 4,
            policy_violations: 1,
            overall_status: PolicyStatus::InViolation,
        });
        assert_eq!(model.finish_scan(&job).unwrap(), FinishOutcome::Done);

        let info = model.image("sha:aaa").unwrap();
        assert_eq!(info.status, ScanStatus::Done);
        assert_eq!(info.summary.as_ref().unwrap().vulnerabilities, 4);
        assert!(info.assigned_at_ms.is_none());
        assert!(info.assigned_to.is_none());
    }

    #[test]
    fn finish_failure_without_retries_is_error() {
        let mut model = Model::new(1);
        model.add_image(image("sha:aaa")).unwrap();
        model.next_image(0, None).unwrap();

        assert_eq!(
            model.finish_scan(&finished("sha:aaa", false)).unwrap(),
            FinishOutcome::Failed
        );
        let info = model.image("sha:aaa").unwrap();
        assert_eq!(info.status, ScanStatus::Error);
        assert_eq!(info.failed_attempts, 1);
        assert_eq!(info.last_error.as_deref(), Some("scan client exited 1"));
        // Error is terminal: never handed out again.
        assert!(model.next_image(0, None).is_none());
    }

    #[test]
    fn failed_scans_retry_up_to_policy() {
        let mut model =
            Model::new(1).with_failed_scan_policy(FailedScanPolicy { max_retries: 2 });
        model.add_image(image("sha:aaa")).unwrap();

        for attempt in 1..=2 {
            model.next_image(0, None).unwrap();
            assert_eq!(
                model.finish_scan(&finished("sha:aaa", false)).unwrap(),
                FinishOutcome::Retrying { attempt }
            );
            assert_eq!(model.image("sha:aaa").unwrap().status, ScanStatus::Unknown);
        }

        model.next_image(0, None).unwrap();
        assert_eq!(
            model.finish_scan(&finished("sha:aaa", false)).unwrap(),
            FinishOutcome::Failed
        );
        assert_eq!(model.image("sha:aaa").unwrap().failed_attempts, 3);
    }

    #[test]
    fn finish_for_idle_image_is_stale() {
        let mut model = Model::new(1);
        model.add_image(image("sha:aaa")).unwrap();

        assert_eq!(
            model.finish_scan(&finished("sha:aaa", true)).unwrap(),
            FinishOutcome::Stale {
                status: ScanStatus::Unknown
            }
        );
        assert_eq!(model.image("sha:aaa").unwrap().status, ScanStatus::Unknown);
    }

    #[test]
    fn finish_for_unknown_digest_is_not_found() {
        let mut model = Model::new(1);
        assert!(matches!(
            model.finish_scan(&finished("sha:nope", true)),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn stalled_scan_is_requeued_and_reassigned() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "p1", &["sha:aaa", "sha:bbb"])).unwrap();
        let first = model.next_image(0, Some("w1")).unwrap();

        let timeout = Duration::from_secs(6 * 60 * 60);
        assert!(model.requeue_stalled(5 * HOUR_MS, timeout).is_empty());

        let requeued = model.requeue_stalled(6 * HOUR_MS, timeout);
        assert_eq!(requeued, vec![first.sha.clone()]);
        assert_eq!(model.image(&first.sha).unwrap().status, ScanStatus::Unknown);

        // Discovery order puts the requeued image first again.
        let again = model.next_image(6 * HOUR_MS, Some("w2")).unwrap();
        assert_eq!(again.sha, first.sha);

        // Reports are keyed by digest, so the new assignment accepts one.
        assert!(matches!(
            model.finish_scan(&finished(&first.sha, true)),
            Ok(FinishOutcome::Done)
        ));
    }

    #[test]
    fn late_report_after_requeue_is_stale() {
        let mut model = Model::new(1);
        model.add_image(image("sha:aaa")).unwrap();
        model.next_image(0, None).unwrap();
        model.requeue_stalled(HOUR_MS, Duration::from_secs(60));

        assert_eq!(
            model.finish_scan(&finished("sha:aaa", true)).unwrap(),
            FinishOutcome::Stale {
                status: ScanStatus::Unknown
            }
        );
    }

    /// Small deterministic generator so the sequence test needs no extra crate.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }
    }

    #[test]
    fn random_operation_sequences_hold_invariants() {
        let shas = ["sha:0", "sha:1", "sha:2", "sha:3", "sha:4", "sha:5"];
        for seed in 0..50u64 {
            let mut rng = Lcg(seed);
            let limit = rng.next(4) as usize;
            let mut model = Model::new(limit);
            let mut now = 0u64;

            for _ in 0..200 {
                now += rng.next(10 * 60 * 1000);
                match rng.next(7) {
                    0 | 1 => {
                        let n = rng.next(3) as usize + 1;
                        let picked: Vec<&str> =
                            (0..n).map(|_| shas[rng.next(shas.len() as u64) as usize]).collect();
                        let name = format!("p{}", rng.next(5));
                        model.add_pod(pod("ns", &name, &picked)).unwrap();
                    }
                    2 => {
                        model.delete_pod(&format!("ns/p{}", rng.next(5)));
                    }
                    3 => {
                        let before: Vec<Sha> = model.stalled_scans(now, Duration::ZERO);
                        if let Some(spec) = model.next_image(now, None) {
                            assert!(!before.contains(&spec.sha), "digest handed out twice");
                        }
                    }
                    4 => {
                        let sha = shas[rng.next(shas.len() as u64) as usize];
                        let _ = model.finish_scan(&finished(sha, rng.next(2) == 0));
                    }
                    5 => {
                        model.requeue_stalled(now, Duration::from_secs(60 * 60));
                    }
                    _ => {
                        let keep = shas[rng.next(shas.len() as u64) as usize];
                        model.replace_all_images(vec![image(keep)]).unwrap();
                    }
                }

                assert!(
                    model.in_progress_count() <= model.concurrency_limit(),
                    "seed {seed}: budget exceeded"
                );
                assert_references_resolve(&model);
            }
        }
    }
}
