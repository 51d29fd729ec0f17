//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable, gemeinsam fuer alle sechs
//! Komponenten-Binaries (§10):
//! - `TELEFONKERN_LOG_LEVEL`: Log-Level (trace/debug/info/warn/error), Standard: info
//! - `TELEFONKERN_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Anruf-ID `C` wird je Komponente als Tracing-Span-Feld auf die
//! Pro-Anruf-Tasks gelegt, nicht hier global.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialisiert das Logging-System.
///
/// Liest `TELEFONKERN_LOG_LEVEL` und `TELEFONKERN_LOG_FORMAT` aus der
/// Umgebung, mit Fallback auf die uebergebenen Konfigurationswerte.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("TELEFONKERN_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var("TELEFONKERN_LOG_FORMAT")
        .unwrap_or_else(|_| format.to_string());

    match format_env.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Gibt den konfigurierten Log-Level aus der Umgebung zurueck.
/// Fallback: "info"
pub fn log_level_aus_env() -> String {
    std::env::var("TELEFONKERN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Gibt das konfigurierte Log-Format aus der Umgebung zurueck.
/// Fallback: "text"
pub fn log_format_aus_env() -> String {
    std::env::var("TELEFONKERN_LOG_FORMAT").unwrap_or_else(|_| "text".to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
