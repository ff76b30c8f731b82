//! Mock Milvus RESTful server with simulated search latency.

use anyhow::Context;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::config::MockServerConfig;

/// Running mock Milvus endpoint; shuts down on `shutdown` or drop
pub struct MockMilvusServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
}

fn router(config: MockServerConfig) -> Router {
    Router::new()
        .route("/v2/vectordb/collections/describe", post(handle_describe))
        .route("/v2/vectordb/entities/search", post(handle_search))
        .with_state(Arc::new(config))
}

impl MockMilvusServer {
    /// Bind `127.0.0.1:{config.port}` (0 picks a free port) and start serving
    pub async fn spawn(config: MockServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", config.port))
            .await
            .with_context(|| format!("Failed to bind mock server on port {}", config.port))?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(config);
        let serve_task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                })
                .await;
            if let Err(e) = served {
                tracing::warn!(error = %e, "Mock Milvus server exited with error");
            }
        });

        tracing::debug!(%addr, "Mock Milvus server listening");
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            serve_task: Some(serve_task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URI to hand to a `MilvusConnector`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting requests and wait for the serve task to finish
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).ok();
        }
        if let Some(task) = self.serve_task.take() {
            task.await.context("Mock Milvus server task panicked")?;
        }
        Ok(())
    }
}

impl Drop for MockMilvusServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).ok();
        }
    }
}

/// Handle collections/describe requests
async fn handle_describe(
    State(config): State<Arc<MockServerConfig>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let requested = body
        .get("collectionName")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if requested != config.collection_name {
        return Json(json!({
            "code": 100,
            "message": format!("collection not found[collection={}]", requested)
        }));
    }

    Json(json!({
        "code": 0,
        "data": {
            "collectionName": config.collection_name,
            "load": "LoadStateLoaded"
        }
    }))
}

/// Handle entities/search requests
async fn handle_search(
    State(config): State<Arc<MockServerConfig>>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    // Sample everything before the await; ThreadRng is not Send
    let (latency, fail) = {
        let mut rng = rand::thread_rng();
        let latency = if config.latency_max_ms > config.latency_min_ms {
            rng.gen_range(config.latency_min_ms..=config.latency_max_ms)
        } else {
            config.latency_min_ms
        };
        let fail = config.error_rate > 0.0 && rng.gen::<f64>() < config.error_rate;
        (latency, fail)
    };

    tokio::time::sleep(Duration::from_millis(latency)).await;

    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response();
    }

    let limit = body.get("limit").and_then(Value::as_u64).unwrap_or(10);
    let hits: Vec<Value> = (0..limit)
        .map(|i| json!({ "id": i, "distance": 1.0 - i as f64 * 0.01 }))
        .collect();

    Json(json!({ "code": 0, "cost": 0, "data": hits })).into_response()
}
