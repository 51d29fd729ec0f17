//! Synthesizer – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den
//! Steuerkanal-Loop sowie die Diagnose-Oberflaeche. Die produktive
//! TTS-Implementierung ist ein Erweiterungspunkt: `telefonkern-engine`
//! traegt bewusst kein Modell, daher wird hier bis zur Anbindung eines
//! echten Primitives `telefonkern_engine::testing::FakeTts` verdrahtet.

use anyhow::Result;
use telefonkern_engine::testing::FakeTts;
use telefonkern_engine::tts::TtsEngine;
use telefonkern_observability::{
    logging_initialisieren, observability_server_starten, HealthState, PipelineMetrics,
};
use synthesizer::config::SynthesizerConfig;
use synthesizer::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("SYNTHESIZER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = SynthesizerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Synthesizer wird initialisiert"
    );

    let health = HealthState::neu();
    let metrics = PipelineMetrics::neu()?;

    let tts = TtsEngine::new(Box::new(FakeTts::default()));

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

    let server = Server::neu(config, tts, metrics, health);
    server.starten().await?;

    Ok(())
}
