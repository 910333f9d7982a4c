//! Gateway — the request/response front of the model writer.
//!
//! Each public method turns into one [`Operation`] on a bounded queue and
//! awaits the writer's reply. Operations are applied strictly in queue
//! order, so a caller always observes its own earlier writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scanward_metrics::{OperationKind, ScanMetrics};
use scanward_state::*;

use crate::error::{GatewayError, GatewayResult};

/// Queue depth before submitters start waiting for the writer.
const QUEUE_DEPTH: usize = 1024;

type Reply<T> = oneshot::Sender<T>;

/// One unit of work for the model writer.
enum Operation {
    AddPod(Pod, Reply<ModelResult<()>>),
    UpdatePod(Pod, Reply<ModelResult<()>>),
    DeletePod(QualifiedName, Reply<bool>),
    AddImage(Image, Reply<ModelResult<()>>),
    ReplaceAllPods(Vec<Pod>, Reply<ModelResult<()>>),
    ReplaceAllImages(Vec<Image>, Reply<ModelResult<usize>>),
    NextImage(Option<String>, Reply<NextImage>),
    FinishScan(FinishedScan, Reply<()>),
    SetConcurrencyLimit(i64, Reply<ModelResult<()>>),
    ScanResults(Reply<ScanResults>),
    Snapshot(Reply<ModelSnapshot>),
    Stats(Reply<ModelStats>),
    RequeueStalled(Duration, Reply<Vec<Sha>>),
}

impl Operation {
    fn kind(&self) -> OperationKind {
        match self {
            Operation::AddPod(..) => OperationKind::AddPod,
            Operation::UpdatePod(..) => OperationKind::UpdatePod,
            Operation::DeletePod(..) => OperationKind::DeletePod,
            Operation::AddImage(..) => OperationKind::AddImage,
            Operation::ReplaceAllPods(..) => OperationKind::ReplaceAllPods,
            Operation::ReplaceAllImages(..) => OperationKind::ReplaceAllImages,
            Operation::NextImage(..) => OperationKind::NextImage,
            Operation::FinishScan(..) => OperationKind::FinishScan,
            Operation::SetConcurrencyLimit(..) => OperationKind::SetConcurrencyLimit,
            Operation::ScanResults(..) => OperationKind::ScanResults,
            Operation::Snapshot(..) => OperationKind::Snapshot,
            Operation::Stats(..) => OperationKind::Stats,
            Operation::RequeueStalled(..) => OperationKind::RequeueStalled,
        }
    }
}

/// Cloneable handle for submitting operations to the model writer.
#[derive(Clone)]
pub struct Gateway {
    tx: mpsc::Sender<Operation>,
    metrics: Arc<ScanMetrics>,
}

impl Gateway {
    /// Spawn the writer task that owns `model` and return a handle to it.
    ///
    /// The writer stops once every `Gateway` clone has been dropped.
    pub fn spawn(model: Model, metrics: Arc<ScanMetrics>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let writer = ModelWriter {
            model,
            metrics: Arc::clone(&metrics),
        };
        let handle = tokio::spawn(writer.run(rx));
        (Self { tx, metrics }, handle)
    }

    pub fn metrics(&self) -> &Arc<ScanMetrics> {
        &self.metrics
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Operation,
    ) -> GatewayResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| GatewayError::Closed)?;
        reply_rx.await.map_err(|_| GatewayError::Closed)
    }

    // ── Discovery ──────────────────────────────────────────────────

    pub async fn add_pod(&self, pod: Pod) -> GatewayResult<()> {
        Ok(self.request(|r| Operation::AddPod(pod, r)).await??)
    }

    pub async fn update_pod(&self, pod: Pod) -> GatewayResult<()> {
        Ok(self.request(|r| Operation::UpdatePod(pod, r)).await??)
    }

    /// Returns true if the pod was known.
    pub async fn delete_pod(&self, qualified_name: QualifiedName) -> GatewayResult<bool> {
        self.request(|r| Operation::DeletePod(qualified_name, r))
            .await
    }

    pub async fn add_image(&self, image: Image) -> GatewayResult<()> {
        Ok(self.request(|r| Operation::AddImage(image, r)).await??)
    }

    pub async fn replace_all_pods(&self, pods: Vec<Pod>) -> GatewayResult<()> {
        Ok(self
            .request(|r| Operation::ReplaceAllPods(pods, r))
            .await??)
    }

    /// Returns how many unreferenced images were dropped.
    pub async fn replace_all_images(&self, images: Vec<Image>) -> GatewayResult<usize> {
        Ok(self
            .request(|r| Operation::ReplaceAllImages(images, r))
            .await??)
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Assign the next image, or `image_spec: None` when there is no work.
    pub async fn next_image(&self, worker: Option<String>) -> GatewayResult<NextImage> {
        self.request(|r| Operation::NextImage(worker, r)).await
    }

    /// Record a completion. Stale or unknown digests are counted, not failed.
    pub async fn finish_scan(&self, job: FinishedScan) -> GatewayResult<()> {
        self.request(|r| Operation::FinishScan(job, r)).await
    }

    // ── Control & queries ──────────────────────────────────────────

    pub async fn set_concurrency_limit(&self, limit: i64) -> GatewayResult<()> {
        Ok(self
            .request(|r| Operation::SetConcurrencyLimit(limit, r))
            .await??)
    }

    pub async fn scan_results(&self) -> GatewayResult<ScanResults> {
        self.request(Operation::ScanResults).await
    }

    pub async fn snapshot(&self) -> GatewayResult<ModelSnapshot> {
        self.request(Operation::Snapshot).await
    }

    pub async fn stats(&self) -> GatewayResult<ModelStats> {
        self.request(Operation::Stats).await
    }

    /// Requeue every scan assigned at least `client_timeout` ago.
    pub async fn requeue_stalled(&self, client_timeout: Duration) -> GatewayResult<Vec<Sha>> {
        self.request(|r| Operation::RequeueStalled(client_timeout, r))
            .await
    }
}

/// The single owner of the model.
struct ModelWriter {
    model: Model,
    metrics: Arc<ScanMetrics>,
}

impl ModelWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<Operation>) {
        info!(
            limit = self.model.concurrency_limit(),
            max_retries = self.model.failed_scan_policy().max_retries,
            "model writer started"
        );
        while let Some(op) = rx.recv().await {
            self.apply(op);
        }
        info!("model writer stopped");
    }

    /// Apply one operation. A dropped reply receiver is not an error.
    fn apply(&mut self, op: Operation) {
        self.metrics.record_operation(op.kind());

        match op {
            Operation::AddPod(pod, reply) => {
                let name = pod.qualified_name();
                let uid = pod.uid.clone();
                let result = self.model.add_pod(pod);
                self.log_result("add pod", &name, &result);
                if result.is_ok() {
                    info!(pod = %name, %uid, "handled add pod");
                }
                let _ = reply.send(result);
            }
            Operation::UpdatePod(pod, reply) => {
                let name = pod.qualified_name();
                let uid = pod.uid.clone();
                let result = self.model.update_pod(pod);
                self.log_result("update pod", &name, &result);
                if result.is_ok() {
                    info!(pod = %name, %uid, "handled update pod");
                }
                let _ = reply.send(result);
            }
            Operation::DeletePod(name, reply) => {
                let existed = self.model.delete_pod(&name);
                if existed {
                    info!(pod = %name, "handled delete pod");
                } else {
                    warn!(pod = %name, "delete for unknown pod");
                }
                let _ = reply.send(existed);
            }
            Operation::AddImage(image, reply) => {
                let name = image.human_readable_name();
                let result = self.model.add_image(image);
                self.log_result("add image", &name, &result);
                if result.is_ok() {
                    info!(image = %name, "handled add image");
                }
                let _ = reply.send(result);
            }
            Operation::ReplaceAllPods(pods, reply) => {
                let count = pods.len();
                let result = self.model.replace_all_pods(pods);
                self.log_result("replace all pods", &count.to_string(), &result);
                if result.is_ok() {
                    info!(count, "handled replace all pods");
                }
                let _ = reply.send(result);
            }
            Operation::ReplaceAllImages(images, reply) => {
                let count = images.len();
                let result = self.model.replace_all_images(images);
                self.log_result("replace all images", &count.to_string(), &result);
                if let Ok(removed) = &result {
                    info!(count, removed, "handled replace all images");
                }
                let _ = reply.send(result);
            }
            Operation::NextImage(worker, reply) => {
                let image_spec = self.model.next_image(epoch_millis(), worker.as_deref());
                match &image_spec {
                    Some(spec) => {
                        self.metrics.record_assignment();
                        info!(
                            image = %format!("{}@{}", spec.name, spec.sha),
                            worker = worker.as_deref().unwrap_or("-"),
                            "handled next image"
                        );
                    }
                    None => debug!(
                        worker = worker.as_deref().unwrap_or("-"),
                        "handled next image -- no work"
                    ),
                }
                let _ = reply.send(NextImage { image_spec });
            }
            Operation::FinishScan(job, reply) => {
                self.finish_scan(&job);
                let _ = reply.send(());
            }
            Operation::SetConcurrencyLimit(limit, reply) => {
                let previous = self.model.concurrency_limit();
                let result = self.model.set_concurrency_limit(limit);
                match &result {
                    Ok(()) => info!(previous, limit, "handled set concurrent scan limit"),
                    Err(e) => warn!(limit, error = %e, "rejected concurrent scan limit"),
                }
                let _ = reply.send(result);
            }
            Operation::ScanResults(reply) => {
                let results = self.model.scan_results();
                debug!(
                    pods = results.pods.len(),
                    images = results.images.len(),
                    "handled get scan results"
                );
                let _ = reply.send(results);
            }
            Operation::Snapshot(reply) => {
                let _ = reply.send(self.model.snapshot());
                debug!("handled get model");
            }
            Operation::Stats(reply) => {
                let _ = reply.send(self.model.stats());
            }
            Operation::RequeueStalled(timeout, reply) => {
                let requeued = self.model.requeue_stalled(epoch_millis(), timeout);
                if !requeued.is_empty() {
                    self.metrics.record_stalled_scans(requeued.len());
                    info!(count = requeued.len(), "requeued stalled scans");
                }
                let _ = reply.send(requeued);
            }
        }
    }

    fn finish_scan(&mut self, job: &FinishedScan) {
        match self.model.finish_scan(job) {
            Ok(FinishOutcome::Done) => {
                self.metrics.record_scan_done();
                info!(sha = %job.digest, "handled finished scan -- done");
            }
            Ok(FinishOutcome::Failed) => {
                self.metrics.record_scan_failed();
                warn!(
                    sha = %job.digest,
                    error = job.error_message.as_deref().unwrap_or(""),
                    "handled finished scan -- error"
                );
            }
            Ok(FinishOutcome::Retrying { attempt }) => {
                self.metrics.record_scan_retry();
                info!(sha = %job.digest, attempt, "handled finished scan -- retrying");
            }
            Ok(FinishOutcome::Stale { status }) => {
                self.metrics.record_stale_completion();
                warn!(
                    sha = %job.digest,
                    status = status.as_str(),
                    "ignoring finished scan for image not in progress"
                );
            }
            Err(e) => {
                self.metrics.record_stale_completion();
                warn!(sha = %job.digest, error = %e, "ignoring finished scan for unknown image");
            }
        }
    }

    fn log_result<T>(&self, what: &str, subject: &str, result: &ModelResult<T>) {
        if let Err(e) = result {
            warn!(operation = what, subject, error = %e, "rejected operation");
        }
    }
}
