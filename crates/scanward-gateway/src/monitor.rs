//! Stalled-scan monitor — requeues scans whose worker went quiet.
//!
//! Every `check_interval` the monitor asks the writer to move any image
//! that has been `InProgress` for at least `client_timeout` back to
//! `Unknown`. The sweep itself runs inside the writer, so it is ordered
//! with every other operation.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use scanward_state::Sha;

use crate::error::GatewayResult;
use crate::gateway::Gateway;

pub struct StalledScanMonitor {
    gateway: Gateway,
    check_interval: Duration,
    client_timeout: Duration,
}

impl StalledScanMonitor {
    pub fn new(gateway: Gateway, check_interval: Duration, client_timeout: Duration) -> Self {
        Self {
            gateway,
            check_interval,
            client_timeout,
        }
    }

    /// One pass. Returns the requeued digests.
    pub async fn sweep(&self) -> GatewayResult<Vec<Sha>> {
        let requeued = self.gateway.requeue_stalled(self.client_timeout).await?;
        if requeued.is_empty() {
            debug!("no stalled scans");
        } else {
            info!(count = requeued.len(), shas = ?requeued, "stalled scans requeued");
        }
        Ok(requeued)
    }

    /// Sweep every `check_interval` until `shutdown` flips or the writer
    /// goes away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            client_timeout_secs = self.client_timeout.as_secs(),
            "stalled scan monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "stalled scan sweep failed, stopping monitor");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("stalled scan monitor shutting down");
                    break;
                }
            }
        }
    }
}
