//! Concurrent benchmark engine.
//!
//! This module provides the pieces of a concurrency sweep:
//! - Query pool shared read-only by the workers of a level
//! - Two-phase rendezvous barrier for a synchronized start
//! - Worker units on dedicated threads, one backend session each
//! - Run controller for a single level and the sweep driver across levels
//! - Aggregation into QPS and latency percentiles, plus report generation
//! - Mock Milvus server for standalone runs

pub mod aggregate;
pub mod barrier;
pub mod config;
pub mod controller;
pub mod mock_server;
pub mod query_pool;
pub mod report;
pub mod sweep;
pub mod worker;

pub use aggregate::{summarize, LevelSummary};
pub use barrier::{BarrierPhase, Participant, ReadyParticipant, Rendezvous};
pub use config::{BenchConfig, MockServerConfig, QueryErrorPolicy};
pub use controller::{LevelRun, RunController};
pub use mock_server::MockMilvusServer;
pub use query_pool::QueryPool;
pub use report::{LevelOutcome, SweepReport};
pub use sweep::SweepDriver;
pub use worker::{WorkerContext, WorkerResult};
