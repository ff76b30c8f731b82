//! Worker unit: one isolated client issuing queries back to back.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::barrier::Participant;
use super::config::QueryErrorPolicy;
use super::query_pool::QueryPool;
use crate::backend::Connector;
use crate::error::{BarrierError, WorkerError};

/// Outcome of a worker's timed loop, handed back exactly once
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub worker_id: usize,
    /// Completed queries
    pub count: u64,
    /// Latency of every completed query, in seconds
    pub latencies: Vec<f64>,
    /// Queries that failed under [`QueryErrorPolicy::Skip`]
    pub failed_queries: u64,
    /// When the timed loop began
    pub started_at: Instant,
}

/// Everything a worker needs besides its barrier handle
#[derive(Clone)]
pub struct WorkerContext {
    pub worker_id: usize,
    pub pool: Arc<QueryPool>,
    pub duration: Duration,
    pub top_k: usize,
    pub policy: QueryErrorPolicy,
    pub connector: Arc<dyn Connector>,
}

/// Receiver for the single result of a spawned worker
pub type WorkerHandle = oneshot::Receiver<Result<WorkerResult, WorkerError>>;

/// Connect, rendezvous, then run the timed query loop
pub async fn run_worker(
    ctx: WorkerContext,
    participant: Participant,
) -> Result<WorkerResult, WorkerError> {
    // A failed connect drops the participant without a ready signal
    let mut session = ctx.connector.connect(ctx.worker_id).await?;

    let ready = participant.signal_ready();
    let mut stop = ready.await_release().await?;

    let started_at = Instant::now();
    let deadline = started_at + ctx.duration;
    let mut latencies = Vec::new();
    let mut count: u64 = 0;
    let mut failed_queries: u64 = 0;

    for index in ctx.pool.cursor() {
        if Instant::now() >= deadline {
            break;
        }

        let query = ctx.pool.get(index);
        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = stop.stopped() => {
                tracing::debug!(worker = ctx.worker_id, count, "Worker stopped by controller");
                return Err(BarrierError::Stopped.into());
            }
            outcome = session.search(query, ctx.top_k) => outcome,
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(()) => {
                latencies.push(elapsed.as_secs_f64());
                count += 1;
            }
            Err(e) => match ctx.policy {
                QueryErrorPolicy::Abort => return Err(e.into()),
                QueryErrorPolicy::Skip => {
                    tracing::debug!(worker = ctx.worker_id, error = %e, "Search failed, skipping");
                    failed_queries += 1;
                }
            },
        }
    }

    tracing::debug!(
        worker = ctx.worker_id,
        count,
        failed_queries,
        "Worker finished"
    );

    Ok(WorkerResult {
        worker_id: ctx.worker_id,
        count,
        latencies,
        failed_queries,
        started_at,
    })
}

/// Run a worker on a dedicated OS thread with its own single-threaded runtime
///
/// If the thread cannot be spawned or panics, the returned receiver resolves
/// to a `RecvError`.
pub fn spawn_worker(ctx: WorkerContext, participant: Participant) -> WorkerHandle {
    let (tx, rx) = oneshot::channel();
    let worker_id = ctx.worker_id;

    let spawned = std::thread::Builder::new()
        .name(format!("bench-worker-{}", worker_id))
        .spawn(move || {
            let outcome = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(run_worker(ctx, participant)),
                Err(e) => Err(WorkerError::Runtime(e.to_string())),
            };
            let _ = tx.send(outcome);
        });

    if let Err(e) = spawned {
        tracing::error!(worker = worker_id, error = %e, "Failed to spawn worker thread");
    }

    rx
}
