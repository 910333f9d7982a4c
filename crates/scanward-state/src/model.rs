//! Model — the in-memory record of pods, images, and the concurrency budget.
//!
//! Every method runs to completion without suspending and leaves the model
//! consistent: a pod's containers only ever reference images that exist,
//! and invalid input is rejected before anything is touched. Callers are
//! expected to serialize access; the model itself holds no locks.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::dispatch::FailedScanPolicy;
use crate::error::{ModelError, ModelResult};
use crate::types::*;

/// The scan model. Owned by exactly one writer.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) pods: HashMap<QualifiedName, Pod>,
    pub(crate) images: HashMap<Sha, ImageInfo>,
    /// Next discovery sequence number handed to a new image.
    next_seq: u64,
    pub(crate) concurrency_limit: usize,
    pub(crate) failed_scan_policy: FailedScanPolicy,
}

impl Model {
    /// Create an empty model with the given concurrency budget.
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            pods: HashMap::new(),
            images: HashMap::new(),
            next_seq: 0,
            concurrency_limit,
            failed_scan_policy: FailedScanPolicy::default(),
        }
    }

    pub fn with_failed_scan_policy(mut self, policy: FailedScanPolicy) -> Self {
        self.failed_scan_policy = policy;
        self
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Insert or replace a pod, creating records for unseen images.
    pub fn add_pod(&mut self, pod: Pod) -> ModelResult<()> {
        pod.validate()?;
        self.upsert_pod(pod);
        Ok(())
    }

    /// Replace a pod wholesale. Same semantics as [`Model::add_pod`].
    pub fn update_pod(&mut self, pod: Pod) -> ModelResult<()> {
        if !self.pods.contains_key(&pod.qualified_name()) {
            debug!(pod = %pod.qualified_name(), "update for unknown pod, inserting");
        }
        self.add_pod(pod)
    }

    /// Remove a pod. Images are left alone since other pods may share them.
    /// Returns true if the pod existed.
    pub fn delete_pod(&mut self, qualified_name: &str) -> bool {
        self.pods.remove(qualified_name).is_some()
    }

    /// Make the pod set exactly `pods`. Nothing is applied if any pod is invalid.
    pub fn replace_all_pods(&mut self, pods: Vec<Pod>) -> ModelResult<()> {
        for pod in &pods {
            pod.validate()?;
        }

        let keep: HashSet<QualifiedName> = pods.iter().map(Pod::qualified_name).collect();
        let before = self.pods.len();
        self.pods.retain(|name, _| keep.contains(name));
        let removed = before - self.pods.len();

        for pod in pods {
            self.upsert_pod(pod);
        }
        debug!(pods = self.pods.len(), removed, "pods replaced");
        Ok(())
    }

    pub fn pod(&self, qualified_name: &str) -> Option<&Pod> {
        self.pods.get(qualified_name)
    }

    fn upsert_pod(&mut self, pod: Pod) {
        for container in &pod.containers {
            self.upsert_image(&container.image, false);
        }
        self.pods.insert(pod.qualified_name(), pod);
    }

    // ── Images ─────────────────────────────────────────────────────

    /// Insert an image or refresh its metadata. Status is never touched.
    pub fn add_image(&mut self, image: Image) -> ModelResult<()> {
        image.validate()?;
        self.upsert_image(&image, true);
        Ok(())
    }

    /// Upsert every image in `images`, then drop known images missing from
    /// the set unless a current pod still references them.
    ///
    /// Returns the number of images removed.
    pub fn replace_all_images(&mut self, images: Vec<Image>) -> ModelResult<usize> {
        for image in &images {
            image.validate()?;
        }

        let keep: HashSet<&str> = images.iter().map(|i| i.sha.as_str()).collect();
        let referenced: HashSet<&str> = self
            .pods
            .values()
            .flat_map(|p| p.containers.iter())
            .map(|c| c.image.sha.as_str())
            .collect();
        let before = self.images.len();
        self.images
            .retain(|sha, _| keep.contains(sha.as_str()) || referenced.contains(sha.as_str()));
        let removed = before - self.images.len();

        for image in &images {
            self.upsert_image(image, true);
        }
        debug!(images = self.images.len(), removed, "images replaced");
        Ok(removed)
    }

    pub fn image(&self, sha: &str) -> Option<&ImageInfo> {
        self.images.get(sha)
    }

    /// Pod-sourced images carry no priority, so only explicit image adds set it.
    fn upsert_image(&mut self, image: &Image, explicit: bool) {
        match self.images.get_mut(&image.sha) {
            Some(info) => {
                if !image.name.is_empty() {
                    info.image.name.clone_from(&image.name);
                }
                info.image.pull_spec.clone_from(&image.pull_spec);
                if explicit && image.priority.is_some() {
                    info.image.priority = image.priority;
                }
            }
            None => {
                let mut image = image.clone();
                if !explicit {
                    image.priority = None;
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                debug!(image = %image.human_readable_name(), seq, "image discovered");
                self.images
                    .insert(image.sha.clone(), ImageInfo::new(image, seq));
            }
        }
    }

    // ── Budget ─────────────────────────────────────────────────────

    /// Change the concurrency budget. Running scans are never interrupted.
    pub fn set_concurrency_limit(&mut self, limit: i64) -> ModelResult<()> {
        if limit < 0 {
            return Err(ModelError::InvalidArgument(format!(
                "concurrency limit must be >= 0, got {limit}"
            )));
        }
        self.concurrency_limit = usize::try_from(limit).map_err(|_| {
            ModelError::InvalidArgument(format!("concurrency limit {limit} is too large"))
        })?;
        Ok(())
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn failed_scan_policy(&self) -> FailedScanPolicy {
        self.failed_scan_policy
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn in_progress_count(&self) -> usize {
        self.images
            .values()
            .filter(|i| i.status == ScanStatus::InProgress)
            .count()
    }

    pub fn stats(&self) -> ModelStats {
        let mut images = StatusCounts::default();
        for info in self.images.values() {
            images.bump(info.status);
        }
        ModelStats {
            images,
            pods: self.pods.len(),
            concurrency_limit: self.concurrency_limit,
        }
    }

    /// Deep copy of the whole model, ordered by key.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            pods: self
                .pods
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            images: self
                .images
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            concurrency_limit: self.concurrency_limit,
            max_failed_scan_retries: self.failed_scan_policy.max_retries,
            stats: self.stats(),
        }
    }
}
