//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus
//! scraping, independently of whether polling currently succeeds.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use tokio::net::TcpListener;

use crate::metrics::MetricsState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler(State(metrics): State<Arc<MetricsState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], metrics.gather())
}

/// Router serving the metrics endpoint.
pub fn router(metrics: Arc<MetricsState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Bind the metrics listener on `0.0.0.0:port`.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr).await
}

/// Serve the metrics endpoint on an already bound listener.
///
/// This is a long-running task that should be spawned in the background.
pub async fn run_http_server(listener: TcpListener, metrics: Arc<MetricsState>) {
    match listener.local_addr() {
        Ok(addr) => tracing::info!("Prometheus HTTP server listening on {}", addr),
        Err(e) => tracing::warn!("Prometheus HTTP server address unknown: {}", e),
    }

    if let Err(e) = axum::serve(listener, router(metrics)).await {
        tracing::error!("HTTP server error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::ScalarMetric;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get_metrics(addr: SocketAddr) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_registry() {
        let metrics = Arc::new(MetricsState::new().unwrap());
        metrics.set_scalar(ScalarMetric::ClientsOnline, "Alpha", "4");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_http_server(listener, Arc::clone(&metrics)));

        let response = get_metrics(addr).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("text/plain; version=0.0.4"));
        assert!(response.contains("teamspeak_virtualserver_clientsonline{virtualserver_name=\"Alpha\"} 4"));

        // Later updates are visible to later scrapes
        metrics.set_scalar(ScalarMetric::ClientsOnline, "Alpha", "5");
        let response = get_metrics(addr).await;
        assert!(response.contains("teamspeak_virtualserver_clientsonline{virtualserver_name=\"Alpha\"} 5"));
    }
}
