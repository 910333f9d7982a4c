//! Scan results — which images and pods are fully scanned.
//!
//! Derived from the current model on every call; nothing is cached.

use tracing::debug;

use crate::model::Model;
use crate::types::*;

impl Model {
    /// Every `Done` image, and every pod whose images are all `Done`.
    ///
    /// Pods are sorted by qualified name and images by sha.
    pub fn scan_results(&self) -> ScanResults {
        let mut images: Vec<ScannedImage> = self
            .images
            .values()
            .filter(|i| i.status == ScanStatus::Done)
            .map(|i| ScannedImage {
                name: i.image.name.clone(),
                sha: i.image.sha.clone(),
                pull_spec: i.image.pull_spec.clone(),
                status: i.status,
                summary: i.summary.clone(),
            })
            .collect();
        images.sort_by(|a, b| a.sha.cmp(&b.sha));

        let mut pods = Vec::new();
        for (name, pod) in &self.pods {
            match self.pod_summary(pod) {
                Some(summary) => pods.push(ScannedPod {
                    namespace: pod.namespace.clone(),
                    name: pod.name.clone(),
                    uid: pod.uid.clone(),
                    summary,
                }),
                None => debug!(pod = %name, "image scans not complete, skipping"),
            }
        }
        pods.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

        ScanResults { pods, images }
    }

    /// Aggregate summary for a pod, or `None` if any of its images is not `Done`.
    fn pod_summary(&self, pod: &Pod) -> Option<ScanSummary> {
        let mut total = ScanSummary::default();
        for container in &pod.containers {
            let info = self.images.get(&container.image.sha)?;
            if info.status != ScanStatus::Done {
                return None;
            }
            if let Some(summary) = &info.summary {
                total.absorb(summary);
            }
        }
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{image, pod};

    fn complete(model: &mut Model, sha: &str, summary: Option<ScanSummary>) {
        model.next_image(0, None);
        let outcome = model
            .finish_scan(&FinishedScan {
                digest: sha.to_string(),
                success: true,
                error_message: None,
                summary,
            })
            .unwrap();
        assert_eq!(outcome, crate::FinishOutcome::Done);
    }

    #[test]
    fn single_pod_round_trip() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "p1", &["sha:aaa"])).unwrap();

        let spec = model.next_image(0, None).unwrap();
        assert_eq!(spec.sha, "sha:aaa");
        model
            .finish_scan(&FinishedScan {
                digest: "sha:aaa".to_string(),
                success: true,
                error_message: None,
                summary: None,
            })
            .unwrap();

        let results = model.scan_results();
        assert_eq!(results.pods.len(), 1);
        assert_eq!(results.pods[0].name, "p1");
        assert_eq!(results.pods[0].namespace, "ns");
        assert_eq!(results.images.len(), 1);
        assert_eq!(results.images[0].sha, "sha:aaa");
        assert_eq!(results.images[0].status, ScanStatus::Done);
    }

    #[test]
    fn pod_with_pending_image_is_excluded() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "p1", &["sha:aaa", "sha:bbb"])).unwrap();
        complete(&mut model, "sha:aaa", None);

        let results = model.scan_results();
        assert!(results.pods.is_empty());
        assert_eq!(results.images.len(), 1);
        // The pending image stays inspectable through the model.
        assert_eq!(model.image("sha:bbb").unwrap().status, ScanStatus::Unknown);
    }

    #[test]
    fn pod_with_failed_image_is_excluded() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "p1", &["sha:aaa"])).unwrap();
        model.next_image(0, None).unwrap();
        model
            .finish_scan(&FinishedScan {
                digest: "sha:aaa".to_string(),
                success: false,
                error_message: Some("pull failed".to_string()),
                summary: None,
            })
            .unwrap();

        let results = model.scan_results();
        assert!(results.pods.is_empty());
        assert!(results.images.is_empty());
    }

    #[test]
    fn pod_summary_aggregates_images() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "web", &["sha:aaa", "sha:bbb"])).unwrap();
        complete(
            &mut model,
            "sha:aaa",
            Some(ScanSummary {
                vulnerabilities: 2,
                policy_violations: 0,
                overall_status: PolicyStatus::NotInViolation,
            }),
        );
        complete(
            &mut model,
            "sha:bbb",
            Some(ScanSummary {
                vulnerabilities: 5,
                policy_violations: 1,
                overall_status: PolicyStatus::InViolationOverridden,
            }),
        );

        let results = model.scan_results();
        assert_eq!(results.pods.len(), 1);
        let summary = &results.pods[0].summary;
        assert_eq!(summary.vulnerabilities, 7);
        assert_eq!(summary.policy_violations, 1);
        assert_eq!(summary.overall_status, PolicyStatus::InViolationOverridden);
    }

    #[test]
    fn pod_summary_saturates_instead_of_overflowing() {
        let mut model = Model::new(1);
        model.add_pod(pod("ns", "big", &["sha:aaa", "sha:bbb"])).unwrap();
        for sha in ["sha:aaa", "sha:bbb"] {
            complete(
                &mut model,
                sha,
                Some(ScanSummary {
                    vulnerabilities: u32::MAX,
                    policy_violations: u32::MAX,
                    overall_status: PolicyStatus::InViolation,
                }),
            );
        }

        let results = model.scan_results();
        assert_eq!(results.pods.len(), 1);
        assert_eq!(results.pods[0].summary.vulnerabilities, u32::MAX);
        assert_eq!(results.pods[0].summary.policy_violations, u32::MAX);
    }

    #[test]
    fn results_are_sorted_and_include_standalone_images() {
        let mut model = Model::new(5);
        model.add_image(image("sha:ccc")).unwrap();
        model.add_pod(pod("b", "p", &["sha:aaa"])).unwrap();
        model.add_pod(pod("a", "p", &["sha:aaa"])).unwrap();
        complete(&mut model, "sha:ccc", None);
        complete(&mut model, "sha:aaa", None);

        let results = model.scan_results();
        let pods: Vec<String> = results
            .pods
            .iter()
            .map(|p| format!("{}/{}", p.namespace, p.name))
            .collect();
        assert_eq!(pods, vec!["a/p", "b/p"]);
        let shas: Vec<&str> = results.images.iter().map(|i| i.sha.as_str()).collect();
        assert_eq!(shas, vec!["sha:aaa", "sha:ccc"]);
    }
}
