//! Model metrics reporter — periodically copies model stats into gauges.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use scanward_state::ModelStats;

use crate::error::GatewayResult;
use crate::gateway::Gateway;

pub struct ModelMetricsReporter {
    gateway: Gateway,
    interval: Duration,
}

impl ModelMetricsReporter {
    pub fn new(gateway: Gateway, interval: Duration) -> Self {
        Self { gateway, interval }
    }

    /// Read stats through the writer and publish them.
    pub async fn refresh(&self) -> GatewayResult<ModelStats> {
        let stats = self.gateway.stats().await?;
        self.gateway.metrics().set_model_stats(&stats);
        Ok(stats)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "model metrics reporter started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.refresh().await {
                        Ok(stats) => debug!(
                            pods = stats.pods,
                            images = stats.images.total(),
                            "model metrics refreshed"
                        ),
                        Err(e) => {
                            warn!(error = %e, "model metrics refresh failed, stopping reporter");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("model metrics reporter shutting down");
                    break;
                }
            }
        }
    }
}
