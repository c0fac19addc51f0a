//! HTTP server for the Prometheus metrics endpoint.

use crate::metrics::FailoverMetrics;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct MetricsServer {
    metrics: Arc<FailoverMetrics>,
    listen_addr: String,
}

impl MetricsServer {
    pub fn new(metrics: Arc<FailoverMetrics>, listen_addr: String) -> Self {
        Self { metrics, listen_addr }
    }

    pub fn router(metrics: Arc<FailoverMetrics>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(metrics)
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Metrics server listening");
        axum::serve(listener, Self::router(self.metrics)).await
    }
}

async fn metrics_handler(State(metrics): State<Arc<FailoverMetrics>>) -> Response {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DaemonCommand;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_metrics_handler_encodes_registry() {
        let metrics = Arc::new(FailoverMetrics::new());
        metrics.record_command(DaemonCommand::Reload);

        let response = metrics_handler(State(metrics)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("failover_daemon_commands_total{command=\"reload\"} 1"));
    }

    #[tokio::test]
    async fn test_metrics_server_serves_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = MetricsServer::router(Arc::new(FailoverMetrics::new()));
        tokio::spawn(async move { axum::serve(listener, app).await });

        let response = raw_get(addr).await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }

    async fn raw_get(addr: std::net::SocketAddr) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }
}
