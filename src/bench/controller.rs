//! Run controller: drives a single concurrency level from spawn to summary.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::error::RecvError;

use super::aggregate::{summarize, LevelSummary};
use super::barrier::Rendezvous;
use super::config::BenchConfig;
use super::query_pool::QueryPool;
use super::worker::{spawn_worker, WorkerContext, WorkerResult};
use crate::backend::Connector;
use crate::error::{BarrierError, LevelError, Result, WorkerError};

/// Upper bound on waiting for stopped workers to hand back their threads
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw outcome of a level before aggregation
#[derive(Debug)]
pub struct LevelRun {
    pub concurrency: usize,
    /// When the barrier was released
    pub released_at: Instant,
    /// One result per worker, in completion order
    pub results: Vec<WorkerResult>,
}

/// Owns the worker pool for one concurrency level at a time
pub struct RunController {
    config: BenchConfig,
    connector: Arc<dyn Connector>,
}

impl RunController {
    pub fn new(config: BenchConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run one level and aggregate its results
    pub async fn run(&self, concurrency: usize) -> Result<LevelSummary> {
        let run = self.run_level(concurrency).await?;
        let summary = summarize(concurrency, self.config.duration(), &run.results)?;
        Ok(summary)
    }

    /// Spawn `concurrency` workers, release them together, and gather their results
    pub async fn run_level(&self, concurrency: usize) -> Result<LevelRun> {
        let pool = Arc::new(QueryPool::generate(
            self.config.pool_size,
            self.config.dimension,
        ));
        let (barrier, participants) = Rendezvous::new(concurrency);

        let mut pending: FuturesUnordered<_> = participants
            .into_iter()
            .enumerate()
            .map(|(worker_id, participant)| {
                let ctx = WorkerContext {
                    worker_id,
                    pool: pool.clone(),
                    duration: self.config.duration(),
                    top_k: self.config.top_k,
                    policy: self.config.query_error_policy,
                    connector: self.connector.clone(),
                };
                let handle = spawn_worker(ctx, participant);
                async move { (worker_id, handle.await) }
            })
            .collect();

        // Phase one: every worker connected and signaled ready
        let ready_timeout = self.config.ready_timeout();
        let all_ready = async {
            match ready_timeout {
                Some(limit) => tokio::time::timeout(limit, barrier.wait_all_ready())
                    .await
                    .is_ok(),
                None => {
                    barrier.wait_all_ready().await;
                    true
                }
            }
        };

        let early = tokio::select! {
            ready = all_ready => (!ready).then(|| LevelError::ReadyTimeout {
                ready: barrier.ready_count(),
                expected: concurrency,
                timeout_secs: ready_timeout.map(|t| t.as_secs()).unwrap_or_default(),
            }),
            // Nothing may finish before release; anything that does has failed
            Some((worker, outcome)) = pending.next() => Some(early_exit(worker, outcome, &barrier)),
        };
        if let Some(e) = early {
            stop_and_drain(&barrier, &mut pending).await;
            return Err(e);
        }

        // Phase two: go
        let released_at = match barrier.release() {
            Ok(at) => at,
            Err(e) => {
                stop_and_drain(&barrier, &mut pending).await;
                return Err(e.into());
            }
        };
        tracing::info!(concurrency, "All workers are ready, released");

        let mut results = Vec::with_capacity(concurrency);
        let gather = async {
            while let Some((worker, outcome)) = pending.next().await {
                match outcome {
                    Ok(Ok(result)) => results.push(result),
                    Ok(Err(source)) => return Err(LevelError::Worker { worker, source }),
                    Err(_) => return Err(LevelError::WorkerCrashed { worker }),
                }
            }
            Ok::<(), LevelError>(())
        };

        let join_timeout = self.config.join_timeout();
        let gathered = match tokio::time::timeout(join_timeout, gather).await {
            Ok(gathered) => gathered,
            Err(_) => Err(LevelError::JoinTimeout {
                pending: concurrency - results.len(),
                timeout_secs: join_timeout.as_secs(),
            }),
        };
        if let Err(e) = gathered {
            stop_and_drain(&barrier, &mut pending).await;
            return Err(e);
        }

        Ok(LevelRun {
            concurrency,
            released_at,
            results,
        })
    }
}

/// Stop every remaining worker and wait, bounded, for them to exit
///
/// No worker of a failed level may still be querying once the level returns.
async fn stop_and_drain<F: Future>(barrier: &Rendezvous, pending: &mut FuturesUnordered<F>) {
    barrier.stop();
    if pending.is_empty() {
        return;
    }

    let drain = async { while pending.next().await.is_some() {} };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            remaining = pending.len(),
            "Workers did not exit within {}s of being stopped",
            DRAIN_TIMEOUT.as_secs()
        );
    } else {
        tracing::debug!("Remaining workers stopped");
    }
}

/// Classify a worker that terminated while the barrier was still closed
fn early_exit(
    worker: usize,
    outcome: std::result::Result<std::result::Result<WorkerResult, WorkerError>, RecvError>,
    barrier: &Rendezvous,
) -> LevelError {
    match outcome {
        Ok(Err(source)) => LevelError::Worker { worker, source },
        Err(_) => LevelError::WorkerCrashed { worker },
        Ok(Ok(_)) => LevelError::Barrier(BarrierError::Premature {
            ready: barrier.ready_count(),
            expected: barrier.expected(),
        }),
    }
}
