//! Reduction of worker results into per-level throughput and latency figures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::worker::WorkerResult;
use crate::error::AggregateError;

/// Throughput and latency of one concurrency level
///
/// Latencies are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub concurrency: usize,
    pub total_queries: u64,
    pub failed_queries: u64,
    pub qps: f64,
    #[serde(rename = "latency_avg_seconds")]
    pub latency_avg: f64,
    #[serde(rename = "latency_p50_seconds")]
    pub latency_p50: f64,
    #[serde(rename = "latency_p95_seconds")]
    pub latency_p95: f64,
    #[serde(rename = "latency_p99_seconds")]
    pub latency_p99: f64,
    #[serde(rename = "latency_max_seconds")]
    pub latency_max: f64,
}

/// Merge worker results into a [`LevelSummary`]
///
/// QPS divides by the configured `duration`, not the measured elapsed time.
/// The result does not depend on the order of `results`.
pub fn summarize(
    concurrency: usize,
    duration: Duration,
    results: &[WorkerResult],
) -> Result<LevelSummary, AggregateError> {
    let total_queries: u64 = results.iter().map(|r| r.count).sum();
    let failed_queries: u64 = results.iter().map(|r| r.failed_queries).sum();

    let mut samples: Vec<f64> = results
        .iter()
        .flat_map(|r| r.latencies.iter().copied())
        .collect();
    if samples.is_empty() {
        return Err(AggregateError::EmptySampleSet);
    }
    samples.sort_by(|a, b| a.total_cmp(b));

    Ok(LevelSummary {
        concurrency,
        total_queries,
        failed_queries,
        qps: total_queries as f64 / duration.as_secs_f64(),
        latency_avg: mean(&samples),
        latency_p50: percentile(&samples, 50.0),
        latency_p95: percentile(&samples, 95.0),
        latency_p99: percentile(&samples, 99.0),
        latency_max: samples[samples.len() - 1],
    })
}

/// Arithmetic mean; NaN for an empty slice
pub fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// `q`-th percentile (0..=100) of ascending `sorted` samples
///
/// Linear interpolation between the two closest ranks at `q/100 * (len-1)`.
/// Returns NaN for an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
