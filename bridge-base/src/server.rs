use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use derive_new::new;
use eyre::{Result, WrapErr};
use tokio::task::JoinHandle;

use crate::CoreMetrics;

/// A server that serves the health check and metrics routes
#[derive(new, Debug)]
pub struct Server {
    listen_port: u16,
    core_metrics: Arc<CoreMetrics>,
}

impl Server {
    /// routes:
    ///  - health - liveness probe on `/health`
    ///  - metrics - serving OpenMetrics format reports on `/metrics`
    ///     (this is compatible with Prometheus, which ought to be configured to scrape this endpoint)
    pub fn router(&self) -> Router {
        let core_metrics = self.core_metrics.clone();
        Router::new()
            .route("/health", get(|| async { (StatusCode::OK, "OK") }))
            .route(
                "/metrics",
                get(move || Self::gather_metrics(core_metrics.clone())),
            )
    }

    /// Run the HTTP server on `0.0.0.0:<listen_port>`
    pub fn run(self: Arc<Self>) -> JoinHandle<Result<()>> {
        let port = self.listen_port;
        tracing::info!(port, "starting server on 0.0.0.0");
        let app = self.router();

        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                .await
                .wrap_err_with(|| format!("failed to bind to TCP port {port}"))?;
            axum::serve(listener, app)
                .await
                .wrap_err("health server stopped")
        })
    }

    async fn gather_metrics(core_metrics: Arc<CoreMetrics>) -> impl IntoResponse {
        tracing::debug!("Traversing route for /metrics endpoint for serving Prometheus metrics");
        match core_metrics.gather().map(String::from_utf8) {
            Ok(Ok(metrics)) => (StatusCode::OK, metrics),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to gather metrics".into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use prometheus::Registry;

    use super::*;

    #[tokio::test]
    async fn serves_health_and_metrics() {
        let metrics = Arc::new(CoreMetrics::new("test", Registry::new()).unwrap());
        metrics
            .events()
            .with_label_values(&["1", "bridge", "handled"])
            .inc();
        let server = Server::new(0, metrics);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server.router();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let client = reqwest::Client::new();
        let health = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .expect("Failed to send request");
        assert!(health.status().is_success());
        assert_eq!(health.text().await.unwrap(), "OK");

        let body = client
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .expect("Failed to send request")
            .text()
            .await
            .expect("Failed to read response body");
        assert!(body.contains("relayer_events_total"));
    }
}
