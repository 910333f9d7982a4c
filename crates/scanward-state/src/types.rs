//! Domain types for the scan model.
//!
//! These are both the in-memory records held by [`crate::Model`] and the
//! JSON shapes exchanged with the cluster watcher, scanner workers, and
//! auditors. Wire field names are camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Content digest of a container image; the image's primary key.
pub type Sha = String;

/// `namespace/name` of a pod.
pub type QualifiedName = String;

// ── Images ──────────────────────────────────────────────────────────

/// A container image as reported by the cluster watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Human-readable repository name (e.g. `docker.io/library/nginx`).
    #[serde(default)]
    pub name: String,
    pub sha: Sha,
    /// Registry path used by workers to pull the image.
    pub pull_spec: String,
    /// Lower value is scanned sooner. Images without one go last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Image {
    pub fn validate(&self) -> ModelResult<()> {
        if self.sha.trim().is_empty() {
            return Err(ModelError::Validation(format!(
                "image {:?} has no sha",
                self.name
            )));
        }
        if self.pull_spec.trim().is_empty() {
            return Err(ModelError::Validation(format!(
                "image {} has no pull spec",
                self.sha
            )));
        }
        Ok(())
    }

    /// `name@sha`, for logs.
    pub fn human_readable_name(&self) -> String {
        format!("{}@{}", self.name, self.sha)
    }
}

/// Scan lifecycle of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    /// Discovered, not yet assigned to a worker.
    Unknown,
    /// Assigned to a worker; the stall clock is running.
    InProgress,
    Done,
    Error,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        ScanStatus::Unknown,
        ScanStatus::InProgress,
        ScanStatus::Done,
        ScanStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Unknown => "unknown",
            ScanStatus::InProgress => "in_progress",
            ScanStatus::Done => "done",
            ScanStatus::Error => "error",
        }
    }
}

/// Policy verdict reported by the scan backend. Ordered from best to worst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyStatus {
    #[default]
    NotInViolation,
    InViolationOverridden,
    InViolation,
}

/// Vulnerability summary attached to a successful scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub vulnerabilities: u32,
    pub policy_violations: u32,
    pub overall_status: PolicyStatus,
}

impl ScanSummary {
    /// Fold another summary into this one: counts add (saturating at
    /// `u32::MAX`), the worse status wins.
    pub fn absorb(&mut self, other: &ScanSummary) {
        self.vulnerabilities = self.vulnerabilities.saturating_add(other.vulnerabilities);
        self.policy_violations = self.policy_violations.saturating_add(other.policy_violations);
        self.overall_status = self.overall_status.max(other.overall_status);
    }
}

/// Everything the model knows about one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub image: Image,
    pub status: ScanStatus,
    /// Monotonic discovery order; breaks priority ties.
    pub discovered_seq: u64,
    /// Unix millis of the current assignment, set while `InProgress`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub failed_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
}

impl ImageInfo {
    pub(crate) fn new(image: Image, discovered_seq: u64) -> Self {
        Self {
            image,
            status: ScanStatus::Unknown,
            discovered_seq,
            assigned_at_ms: None,
            assigned_to: None,
            failed_attempts: 0,
            last_error: None,
            summary: None,
        }
    }
}

// ── Pods ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: Image,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Pod {
    pub fn qualified_name(&self) -> QualifiedName {
        qualified_name(&self.namespace, &self.name)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.namespace.trim().is_empty() || self.name.trim().is_empty() {
            return Err(ModelError::Validation(format!(
                "pod {:?} is missing namespace or name",
                self.qualified_name()
            )));
        }
        if self.uid.trim().is_empty() {
            return Err(ModelError::Validation(format!(
                "pod {} has no uid",
                self.qualified_name()
            )));
        }
        for container in &self.containers {
            if container.name.trim().is_empty() {
                return Err(ModelError::Validation(format!(
                    "pod {} has a container without a name",
                    self.qualified_name()
                )));
            }
            container.image.validate().map_err(|e| {
                ModelError::Validation(format!(
                    "pod {} container {}: {e}",
                    self.qualified_name(),
                    container.name
                ))
            })?;
        }
        Ok(())
    }
}

pub fn qualified_name(namespace: &str, name: &str) -> QualifiedName {
    format!("{namespace}/{name}")
}

// ── Worker protocol ─────────────────────────────────────────────────

/// What a worker needs to pull and scan an image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub name: String,
    pub sha: Sha,
    pub pull_spec: String,
}

impl From<&Image> for ImageSpec {
    fn from(image: &Image) -> Self {
        Self {
            name: image.name.clone(),
            sha: image.sha.clone(),
            pull_spec: image.pull_spec.clone(),
        }
    }
}

/// Response to a next-image request. `image_spec` is `null` when there is no work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NextImage {
    pub image_spec: Option<ImageSpec>,
}

/// Completion report from a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinishedScan {
    pub digest: Sha,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
}

// ── Results & diagnostics ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScannedImage {
    pub name: String,
    pub sha: Sha,
    pub pull_spec: String,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScannedPod {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    /// Aggregate over the pod's images that reported a summary.
    pub summary: ScanSummary,
}

/// Fully scanned images and pods.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResults {
    pub pods: Vec<ScannedPod>,
    pub images: Vec<ScannedImage>,
}

/// Image counts per scan status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub unknown: usize,
    pub in_progress: usize,
    pub done: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn get(&self, status: ScanStatus) -> usize {
        match status {
            ScanStatus::Unknown => self.unknown,
            ScanStatus::InProgress => self.in_progress,
            ScanStatus::Done => self.done,
            ScanStatus::Error => self.error,
        }
    }

    pub(crate) fn bump(&mut self, status: ScanStatus) {
        match status {
            ScanStatus::Unknown => self.unknown += 1,
            ScanStatus::InProgress => self.in_progress += 1,
            ScanStatus::Done => self.done += 1,
            ScanStatus::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unknown + self.in_progress + self.done + self.error
    }
}

/// Cheap model summary for gauges.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub images: StatusCounts,
    pub pods: usize,
    pub concurrency_limit: usize,
}

/// Deep, independent copy of the whole model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    pub pods: BTreeMap<QualifiedName, Pod>,
    pub images: BTreeMap<Sha, ImageInfo>,
    pub concurrency_limit: usize,
    pub max_failed_scan_retries: u32,
    pub stats: ModelStats,
}

// ── Bulk request bodies ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllPods {
    pub pods: Vec<Pod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllImages {
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetConcurrencyLimit {
    pub limit: i64,
}
