//! telefonkern-observability
//!
//! Diagnostische Nebenoberflaeche jeder Komponente (§10):
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/healthz`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware
//!
//! Rein lesend; beeinflusst nie Anrufentscheidungen und ist kein Ersatz fuer
//! eine Admin-/Konfigurationsoberflaeche.

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, PipelineMetrics};
pub use middleware::request_timing_layer;

use anyhow::Result;
use std::net::SocketAddr;

/// Startet den Observability-HTTP-Server (Metriken + Health) einer Komponente.
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /healthz` – Health-Check JSON
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    health_state: HealthState,
    metriken: PipelineMetrics,
) -> Result<()> {
    use axum::Router;

    let app = Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health_state));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app).await?;
    Ok(())
}
