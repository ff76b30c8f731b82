//! Report generation for sweep results.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::aggregate::LevelSummary;
use super::config::BenchConfig;

/// Result of one concurrency level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LevelOutcome {
    Completed(LevelSummary),
    Failed { concurrency: usize, reason: String },
}

impl LevelOutcome {
    pub fn concurrency(&self) -> usize {
        match self {
            LevelOutcome::Completed(summary) => summary.concurrency,
            LevelOutcome::Failed { concurrency, .. } => *concurrency,
        }
    }

    pub fn summary(&self) -> Option<&LevelSummary> {
        match self {
            LevelOutcome::Completed(summary) => Some(summary),
            LevelOutcome::Failed { .. } => None,
        }
    }
}

/// Complete sweep report, levels in configured order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    /// RFC 3339 time the report was built
    pub timestamp: String,
    /// Backend the sweep ran against
    pub backend: String,
    /// Configuration snapshot for reproducibility
    pub config: BenchConfig,
    /// One outcome per configured level
    pub levels: Vec<LevelOutcome>,
}

impl SweepReport {
    pub fn new(backend: &str, config: BenchConfig, levels: Vec<LevelOutcome>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend: backend.to_string(),
            config,
            levels,
        }
    }

    /// Summaries of the levels that completed, in sweep order
    pub fn summaries(&self) -> Vec<&LevelSummary> {
        self.levels.iter().filter_map(LevelOutcome::summary).collect()
    }

    /// Levels that failed, as `(concurrency, reason)`
    pub fn failures(&self) -> Vec<(usize, &str)> {
        self.levels
            .iter()
            .filter_map(|outcome| match outcome {
                LevelOutcome::Failed {
                    concurrency,
                    reason,
                } => Some((*concurrency, reason.as_str())),
                LevelOutcome::Completed(_) => None,
            })
            .collect()
    }

    /// Completed level with the highest QPS
    pub fn max_qps(&self) -> Option<&LevelSummary> {
        self.summaries()
            .into_iter()
            .max_by(|a, b| a.qps.partial_cmp(&b.qps).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Write the JSON report to `path`
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Render the results table
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<10} | {:<10} | {:<18} | {:<18} | {:<18} | {:<10}\n",
            "conc", "qps", "latency_avg (ms)", "latency_p50 (ms)", "latency_p99 (ms)", "failed"
        ));
        out.push_str(&"─".repeat(98));
        out.push('\n');

        for outcome in &self.levels {
            match outcome {
                LevelOutcome::Completed(s) => out.push_str(&format!(
                    "{:<10} | {:<10.2} | {:<18.2} | {:<18.2} | {:<18.2} | {:<10}\n",
                    s.concurrency,
                    s.qps,
                    s.latency_avg * 1000.0,
                    s.latency_p50 * 1000.0,
                    s.latency_p99 * 1000.0,
                    s.failed_queries
                )),
                LevelOutcome::Failed { concurrency, .. } => out.push_str(&format!(
                    "{:<10} | {:<10} | {:<18} | {:<18} | {:<18} | {:<10}\n",
                    concurrency, "FAILED", "-", "-", "-", "-"
                )),
            }
        }

        out.push_str(&"─".repeat(98));
        out.push('\n');
        out
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        println!();
        print!("{}", self.render_table());
    }

    /// Print a compact summary
    pub fn print_summary(&self) {
        println!("\n=== Sweep Summary ({}) ===", self.backend);
        match self.max_qps() {
            Some(best) => println!(
                "Max QPS: {:.1} at concurrency {} (p99: {:.2}ms)",
                best.qps,
                best.concurrency,
                best.latency_p99 * 1000.0
            ),
            None => println!("Max QPS: N/A (no level completed)"),
        }

        for (concurrency, reason) in self.failures() {
            println!("Concurrency {} failed: {}", concurrency, reason);
        }
    }
}
