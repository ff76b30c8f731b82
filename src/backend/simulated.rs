//! In-process backend with a configurable latency model.
//!
//! Used by the test-suite and for dry runs of the sweep without a server.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Duration;

use super::{Connector, SearchSession};
use crate::error::BackendError;

/// Latency of one simulated search
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyModel {
    Fixed(Duration),
    /// Uniform between `min` and `max` inclusive
    Uniform { min: Duration, max: Duration },
}

impl LatencyModel {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            LatencyModel::Fixed(latency) => latency,
            LatencyModel::Uniform { min, max } if max > min => rng.gen_range(min..=max),
            LatencyModel::Uniform { min, .. } => min,
        }
    }
}

/// Connector producing [`SimulatedSession`]s
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    latency: LatencyModel,
    connect_delay: Duration,
    failing_workers: HashSet<usize>,
    error_rate: f64,
}

impl SimulatedConnector {
    pub fn new(latency: LatencyModel) -> Self {
        Self {
            latency,
            connect_delay: Duration::ZERO,
            failing_workers: HashSet::new(),
            error_rate: 0.0,
        }
    }

    /// Make `connect` fail for the given worker index
    pub fn with_connect_failure(mut self, worker_id: usize) -> Self {
        self.failing_workers.insert(worker_id);
        self
    }

    /// Delay every `connect` call, e.g. to stagger worker start-up
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Fail each search with the given probability (0.0 to 1.0)
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self, worker_id: usize) -> Result<Box<dyn SearchSession>, BackendError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.failing_workers.contains(&worker_id) {
            return Err(BackendError::Connect(format!(
                "simulated connection failure for worker {}",
                worker_id
            )));
        }

        Ok(Box::new(SimulatedSession {
            latency: self.latency,
            error_rate: self.error_rate,
            rng: StdRng::from_entropy(),
        }))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Session that sleeps for the sampled latency instead of doing I/O
pub struct SimulatedSession {
    latency: LatencyModel,
    error_rate: f64,
    rng: StdRng,
}

#[async_trait]
impl SearchSession for SimulatedSession {
    async fn search(&mut self, _query: &[f32], _top_k: usize) -> Result<(), BackendError> {
        let delay = self.latency.sample(&mut self.rng);
        tokio::time::sleep(delay).await;

        if self.error_rate > 0.0 && self.rng.gen::<f64>() < self.error_rate {
            return Err(BackendError::Query("simulated search failure".to_string()));
        }
        Ok(())
    }
}
