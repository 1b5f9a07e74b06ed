//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  - Prometheus text format
//!   GET /healthz  - Liveness check (always 200 if process is running)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::{counter::Counter, family::Family, gauge::Gauge};
use prometheus_client::registry::Registry;
use std::sync::Arc;

use vd_queue::DrainSummary;

type Labels = Vec<(String, String)>;

/// Counters fed from drain summaries and session events.
#[derive(Clone, Default)]
pub struct QueueMetrics {
    uploads: Family<Labels, Counter>,
    drains: Counter,
    session_expired: Counter,
    pending: Gauge,
}

impl QueueMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "vdq_uploads",
            "Uploads by final outcome",
            metrics.uploads.clone(),
        );
        registry.register("vdq_drains", "Completed drain passes", metrics.drains.clone());
        registry.register(
            "vdq_session_expired",
            "Session expiry events seen while online",
            metrics.session_expired.clone(),
        );
        registry.register(
            "vdq_pending_entries",
            "Entries left waiting after the last drain",
            metrics.pending.clone(),
        );
        metrics
    }

    pub fn record_drain(&self, summary: &DrainSummary) {
        self.drains.inc();
        for (outcome, n) in [
            ("completed", summary.completed),
            ("failed", summary.failed),
            ("skipped", summary.skipped),
        ] {
            if n > 0 {
                self.uploads
                    .get_or_create(&vec![("outcome".to_string(), outcome.to_string())])
                    .inc_by(n as u64);
            }
        }
        self.pending.set(summary.pending as i64);
    }

    pub fn record_session_expired(&self) {
        self.session_expired.inc();
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9110")
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match render(&state.registry) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

fn render(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut body = String::new();
    encode(&mut body, registry)?;
    Ok(body)
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
