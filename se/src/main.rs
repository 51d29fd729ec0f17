//! SE – SIP-Endpunkt, Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den
//! Steuerkanal-Loop sowie die Diagnose-Oberflaeche.

use anyhow::Result;
use se::config::SeConfig;
use se::Server;
use telefonkern_observability::{
    logging_initialisieren, observability_server_starten, HealthState, PipelineMetrics,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("SE_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = SeConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "SE wird initialisiert"
    );

    let health = HealthState::neu();
    let metrics = PipelineMetrics::neu()?;

    if config.observability.aktiviert {
        let bind_addr = format!(
            "{}:{}",
            config.observability.bind_adresse, config.observability.port
        )
        .parse()?;
        let health = health.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = observability_server_starten(bind_addr, health, metrics).await {
                tracing::error!(fehler = %e, "Observability-Server abgestuerzt");
            }
        });
    }

    let server = Server::neu(config, metrics, health);
    server.starten().await?;

    Ok(())
}
