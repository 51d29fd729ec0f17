//! Transcriber – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den
//! Steuerkanal-Loop sowie die Diagnose-Oberflaeche. Die produktive
//! ASR-Implementierung ist ein Erweiterungspunkt: `telefonkern-engine`
//! traegt bewusst kein Modell, daher wird hier bis zur Anbindung eines
//! echten Primitives `telefonkern_engine::testing::FakeAsr` verdrahtet.

use std::sync::Arc;

use anyhow::Result;
use telefonkern_db::SqliteDb;
use telefonkern_engine::asr::AsrEngine;
use telefonkern_engine::testing::FakeAsr;
use telefonkern_observability::{
    logging_initialisieren, observability_server_starten, HealthState, PipelineMetrics,
};
use transcriber::config::TranscriberConfig;
use transcriber::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("TRANSCRIBER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = TranscriberConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Transcriber wird initialisiert"
    );

    let health = HealthState::neu();
    let metrics = PipelineMetrics::neu()?;

    let db_config: telefonkern_db::DatabaseConfig = (&config.datenbank).into();
    let db = Arc::new(SqliteDb::oeffnen(&db_config).await?);

    let asr = AsrEngine::new(Box::new(FakeAsr));

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

    let server = Server::neu(config, asr, db, metrics, health);
    server.starten().await?;

    Ok(())
}
