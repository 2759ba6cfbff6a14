use super::BenchMetrics;
use crate::backend::Backend;
use crate::core::Result;
use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Serves `GET /metrics` for a running benchmark.
#[derive(Clone)]
pub struct MetricsServer {
    metrics: Arc<BenchMetrics>,
    backend: Arc<dyn Backend>,
}

impl MetricsServer {
    pub fn new(metrics: Arc<BenchMetrics>, backend: Arc<dyn Backend>) -> Self {
        Self { metrics, backend }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(self.clone())
    }

    /// Bind `addr` and serve until `shutdown` is cancelled.
    ///
    /// A bare `:port` binds every interface.
    pub async fn serve(self, addr: &str, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(bind_address(addr)).await?;
        info!(addr = %listener.local_addr()?, "metrics server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}

async fn render_metrics(State(server): State<MetricsServer>) -> impl IntoResponse {
    let body = server.metrics.render(server.backend.pool_stats());
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

fn bind_address(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}
