//! Sweep driver: runs every configured concurrency level in order.

use std::sync::Arc;

use super::config::BenchConfig;
use super::controller::RunController;
use super::report::{LevelOutcome, SweepReport};
use crate::backend::Connector;

/// Runs the configured levels sequentially with a cooldown in between
pub struct SweepDriver {
    controller: RunController,
    backend: String,
}

impl SweepDriver {
    /// Create a new sweep driver
    pub fn new(config: BenchConfig, connector: Arc<dyn Connector>) -> Self {
        let backend = connector.name().to_string();
        Self {
            controller: RunController::new(config, connector),
            backend,
        }
    }

    pub fn config(&self) -> &BenchConfig {
        self.controller.config()
    }

    /// Run the full sweep; a failed level is recorded and the sweep moves on
    pub async fn run(&self) -> SweepReport {
        let config = self.controller.config();
        let levels = &config.concurrency_levels;
        let mut outcomes = Vec::with_capacity(levels.len());

        for (i, &concurrency) in levels.iter().enumerate() {
            tracing::info!(concurrency, "conc_test [start]");

            match self.controller.run(concurrency).await {
                Ok(summary) => {
                    tracing::info!(
                        concurrency,
                        failed = summary.failed_queries,
                        "conc_test [done]. all_count: {}, qps: {:.2}, latency_avg: {:.2}ms, latency_p99: {:.2}ms",
                        summary.total_queries,
                        summary.qps,
                        summary.latency_avg * 1000.0,
                        summary.latency_p99 * 1000.0
                    );
                    outcomes.push(LevelOutcome::Completed(summary));
                }
                Err(e) => {
                    tracing::warn!(concurrency, error = %e, "Failed to run concurrency level");
                    outcomes.push(LevelOutcome::Failed {
                        concurrency,
                        reason: e.to_string(),
                    });
                }
            }

            if i + 1 < levels.len() && config.cooldown_secs > 0 {
                tracing::info!(seconds = config.cooldown_secs, "Cooling down before next level");
                tokio::time::sleep(config.cooldown()).await;
            }
        }

        SweepReport::new(&self.backend, config.clone(), outcomes)
    }
}
