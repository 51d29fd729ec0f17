//! Prometheus-kompatible Metriken
//!
//! Registrierte Metriken (§10 Observability-Oberflaeche):
//! - `telefonkern_frames_produced_total` – Counter: erzeugte 20ms-Frames
//! - `telefonkern_frames_dropped_total` – Counter: verworfene Frames (Ring voll,
//!   Scheduler-Druck, Ausfall)
//! - `telefonkern_ring_occupancy_ratio` – Gauge: Fuellstand eines Rings (0.0-1.0)
//! - `telefonkern_active_sessions` – Gauge: aktive Anrufsitzungen
//! - `telefonkern_retry_exhausted_total` – Counter: TCP-Connect-Retries erschoepft
//! - `telefonkern_fast_start_latency_seconds` – Histogram: Zeit bis zum ersten
//!   hoerbaren RTP-Frame einer Antwort
//! - `telefonkern_http_requests_total` – Counter: HTTP-Anfragen an diese
//!   Diagnose-Oberflaeche (method, path, status)
//! - `telefonkern_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec,
    IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Prozess-weiten Prometheus-Metriken einer Komponente.
#[derive(Clone)]
pub struct PipelineMetrics {
    pub registry: Arc<Registry>,

    pub frames_produced_total: Counter,
    pub frames_dropped_total: CounterVec,
    pub ring_occupancy_ratio: GaugeVec,
    pub active_sessions: Gauge,
    pub retry_exhausted_total: Counter,
    pub fast_start_latency_seconds: Histogram,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl PipelineMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry.
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let frames_produced_total = Counter::with_opts(Opts::new(
            "telefonkern_frames_produced_total",
            "Gesamtanzahl erzeugter 20ms-Audioframes",
        ))?;
        registry.register(Box::new(frames_produced_total.clone()))?;

        let frames_dropped_total = CounterVec::new(
            Opts::new(
                "telefonkern_frames_dropped_total",
                "Gesamtanzahl verworfener Audioframes",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(frames_dropped_total.clone()))?;

        let ring_occupancy_ratio = GaugeVec::new(
            Opts::new(
                "telefonkern_ring_occupancy_ratio",
                "Fuellstand eines SHM-Rings (0.0 bis 1.0)",
            ),
            &["ring"],
        )?;
        registry.register(Box::new(ring_occupancy_ratio.clone()))?;

        let active_sessions = Gauge::with_opts(Opts::new(
            "telefonkern_active_sessions",
            "Anzahl aktiver Anrufsitzungen",
        ))?;
        registry.register(Box::new(active_sessions.clone()))?;

        let retry_exhausted_total = Counter::with_opts(Opts::new(
            "telefonkern_retry_exhausted_total",
            "Gesamtanzahl erschoepfter TCP-Connect-Retry-Serien",
        ))?;
        registry.register(Box::new(retry_exhausted_total.clone()))?;

        let fast_start_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "telefonkern_fast_start_latency_seconds",
                "Zeit von Antwortbeginn bis zum ersten hoerbaren RTP-Frame",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0]),
        )?;
        registry.register(Box::new(fast_start_latency_seconds.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("telefonkern_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "telefonkern_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            frames_produced_total,
            frames_dropped_total,
            ring_occupancy_ratio,
            active_sessions,
            retry_exhausted_total,
            fast_start_latency_seconds,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat.
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt.
pub fn metrics_router(metriken: PipelineMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<PipelineMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = PipelineMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn gauge_active_sessions_setzen() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken.active_sessions.set(3.0);
        assert_eq!(metriken.active_sessions.get(), 3.0);
    }

    #[test]
    fn counter_frames_produced_inkrementieren() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken.frames_produced_total.inc();
        metriken.frames_produced_total.inc_by(9.0);
        assert_eq!(metriken.frames_produced_total.get(), 10.0);
    }

    #[test]
    fn frames_dropped_mit_grund_label() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken
            .frames_dropped_total
            .with_label_values(&["ring_voll"])
            .inc();
        let wert = metriken
            .frames_dropped_total
            .with_label_values(&["ring_voll"])
            .get();
        assert_eq!(wert, 1.0);
    }

    #[test]
    fn ring_occupancy_je_ring_getrennt() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken
            .ring_occupancy_ratio
            .with_label_values(&["ap_in_7"])
            .set(0.42);
        metriken
            .ring_occupancy_ratio
            .with_label_values(&["ap_out_7"])
            .set(0.1);
        assert_eq!(
            metriken
                .ring_occupancy_ratio
                .with_label_values(&["ap_in_7"])
                .get(),
            0.42
        );
    }

    #[test]
    fn fast_start_latency_beobachten() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken.fast_start_latency_seconds.observe(0.08);
        metriken.fast_start_latency_seconds.observe(0.15);
    }

    #[test]
    fn http_counter_mit_labels() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/healthz", "200"])
            .inc();
        let wert = metriken
            .http_requests_total
            .with_label_values(&["GET", "/healthz", "200"])
            .get();
        assert_eq!(wert, 1);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = PipelineMetrics::neu().unwrap();
        metriken.active_sessions.set(2.0);
        metriken.frames_produced_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("telefonkern_active_sessions"));
        assert!(output.contains("telefonkern_frames_produced_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = PipelineMetrics::neu().unwrap();

        metriken
            .frames_dropped_total
            .with_label_values(&["test"])
            .inc();
        metriken
            .ring_occupancy_ratio
            .with_label_values(&["test"])
            .set(0.0);
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        metriken
            .http_request_duration_seconds
            .with_label_values(&["GET", "/test"])
            .observe(0.01);

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        assert!(namen.contains(&"telefonkern_frames_produced_total"));
        assert!(namen.contains(&"telefonkern_frames_dropped_total"));
        assert!(namen.contains(&"telefonkern_ring_occupancy_ratio"));
        assert!(namen.contains(&"telefonkern_active_sessions"));
        assert!(namen.contains(&"telefonkern_retry_exhausted_total"));
        assert!(namen.contains(&"telefonkern_fast_start_latency_seconds"));
        assert!(namen.contains(&"telefonkern_http_requests_total"));
        assert!(namen.contains(&"telefonkern_http_request_duration_seconds"));
    }
}
