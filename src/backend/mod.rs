//! Search backends driven by the benchmark workers.
//!
//! A [`Connector`] is shared by every worker of a level; each worker calls
//! [`Connector::connect`] once to obtain its own [`SearchSession`], so no
//! connection state is shared between workers.

pub mod milvus;
pub mod simulated;

use async_trait::async_trait;

use crate::error::BackendError;

pub use milvus::{MilvusConfig, MilvusConnector};
pub use simulated::{LatencyModel, SimulatedConnector};

/// One worker's private session with the backend
#[async_trait]
pub trait SearchSession: Send {
    /// Issue a single top-k search; the result content is discarded
    async fn search(&mut self, query: &[f32], top_k: usize) -> Result<(), BackendError>;
}

/// Factory for backend sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session for the given worker
    async fn connect(&self, worker_id: usize) -> Result<Box<dyn SearchSession>, BackendError>;

    /// Backend name used in logs and reports
    fn name(&self) -> &str;
}
