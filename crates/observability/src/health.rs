//! Health-Check-Endpunkt
//!
//! Endpoint: `GET /healthz`
//! Response: JSON mit Prozess-Liveness, Uptime und aktueller Ring-/
//! Sitzungstabellengroesse. Rein diagnostisch, beeinflusst nie
//! Anrufentscheidungen.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub ring_count: u64,
    pub session_count: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler. Jede Komponente aktualisiert
/// `ring_count`/`session_count` aus ihrer eigenen Ring-/Sitzungstabelle.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub ring_count: Arc<AtomicU64>,
    pub session_count: Arc<AtomicU64>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            ring_count: Arc::new(AtomicU64::new(0)),
            session_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn ring_count_setzen(&self, wert: u64) {
        self.ring_count.store(wert, Ordering::Relaxed);
    }

    pub fn session_count_setzen(&self, wert: u64) {
        self.session_count.store(wert, Ordering::Relaxed);
    }
}

/// Axum-Router fuer den `/healthz`-Endpunkt.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        ring_count: state.ring_count.load(Ordering::Relaxed),
        session_count: state.session_count.load(Ordering::Relaxed),
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_uptime_frisch_erstellt() {
        let state = HealthState::neu();
        assert!(state.uptime_seconds() < 5);
    }

    #[test]
    fn health_state_zaehler_aktualisieren() {
        let state = HealthState::neu();
        state.ring_count_setzen(2);
        state.session_count_setzen(5);
        assert_eq!(state.ring_count.load(Ordering::Relaxed), 2);
        assert_eq!(state.session_count.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            ring_count: 3,
            session_count: 7,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"ring_count\":3"));
        assert!(json.contains("\"session_count\":7"));
    }

    #[test]
    fn health_response_deserialisierung() {
        let json = r#"{"status":"healthy","version":"0.1.0","uptime_seconds":100,"ring_count":1,"session_count":2}"#;
        let response: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.ring_count, 1);
        assert_eq!(response.session_count, 2);
    }
}
