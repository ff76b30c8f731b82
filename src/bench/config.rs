//! Configuration structs for benchmarking.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// What a worker does when a single search call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryErrorPolicy {
    /// The first failed query fails the worker and therefore the level
    #[default]
    Abort,
    /// Failed queries are tallied separately and excluded from count and latencies
    Skip,
}

impl std::fmt::Display for QueryErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryErrorPolicy::Abort => write!(f, "abort"),
            QueryErrorPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for QueryErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(QueryErrorPolicy::Abort),
            "skip" => Ok(QueryErrorPolicy::Skip),
            _ => Err(format!("Unknown query error policy: {}", s)),
        }
    }
}

/// Configuration for the mock Milvus server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockServerConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Lower bound of simulated search latency in milliseconds
    pub latency_min_ms: u64,
    /// Upper bound of simulated search latency in milliseconds
    pub latency_max_ms: u64,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
    /// Collection name the server answers for
    pub collection_name: String,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_min_ms: 5,
            latency_max_ms: 15,
            error_rate: 0.0,
            collection_name: "conc_bench".to_string(),
        }
    }
}

/// Configuration for a concurrency sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Dimension of the generated query vectors
    pub dimension: usize,
    /// Number of query vectors generated per level
    pub pool_size: usize,
    /// Concurrency levels to test, in order
    pub concurrency_levels: Vec<usize>,
    /// Duration per concurrency level in seconds
    pub duration_secs: u64,
    /// Idle time between two levels in seconds
    pub cooldown_secs: u64,
    /// Number of neighbours requested per search
    pub top_k: usize,
    /// Upper bound on waiting for every worker to become ready (None waits forever)
    pub ready_timeout_secs: Option<u64>,
    /// Extra time past the run duration allowed for workers to hand back results
    pub join_grace_secs: u64,
    /// Handling of individual failed searches
    pub query_error_policy: QueryErrorPolicy,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            pool_size: 1000,
            concurrency_levels: vec![1, 5, 10, 20],
            duration_secs: 30,
            cooldown_secs: 10,
            top_k: 10,
            ready_timeout_secs: Some(120),
            join_grace_secs: 60,
            query_error_policy: QueryErrorPolicy::Abort,
        }
    }
}

impl BenchConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }

    /// Bound on gathering worker results once the barrier has been released
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.duration_secs + self.join_grace_secs)
    }

    /// Reject settings that would make a sweep meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_levels.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one concurrency level is required".to_string(),
            ));
        }
        if self.concurrency_levels.contains(&0) {
            return Err(ConfigError::Invalid(
                "concurrency levels must be greater than zero".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(ConfigError::Invalid("dimension must be greater than zero".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool size must be greater than zero".to_string()));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Invalid("duration must be greater than zero".to_string()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top-k must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Parse a comma-separated level list such as `1,5,10`; empty items are skipped
pub fn parse_levels(s: &str) -> Result<Vec<usize>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<usize>()
                .map_err(|_| ConfigError::Invalid(format!("invalid concurrency level: {}", item)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BenchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_levels() {
        let config = BenchConfig {
            concurrency_levels: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_level() {
        let config = BenchConfig {
            concurrency_levels: vec![1, 0, 4],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let config = BenchConfig {
            duration_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_join_timeout_adds_grace() {
        let config = BenchConfig {
            duration_secs: 30,
            join_grace_secs: 15,
            ..Default::default()
        };
        assert_eq!(config.join_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!(parse_levels("1,5,10").unwrap(), vec![1, 5, 10]);
        assert_eq!(parse_levels(" 1, 20 ,").unwrap(), vec![1, 20]);
        assert!(parse_levels("1,x").is_err());
    }

    #[test]
    fn test_query_error_policy_parse() {
        assert_eq!("abort".parse::<QueryErrorPolicy>().unwrap(), QueryErrorPolicy::Abort);
        assert_eq!("SKIP".parse::<QueryErrorPolicy>().unwrap(), QueryErrorPolicy::Skip);
        assert!("retry".parse::<QueryErrorPolicy>().is_err());
        assert_eq!(QueryErrorPolicy::Skip.to_string(), "skip");
    }
}
