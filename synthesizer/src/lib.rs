//! synthesizer – Bibliotheks-Root
//!
//! Der Synthesizer haelt eine Sitzungstabelle, die von HELLO (R's eingehende
//! TCP-Verbindung auf dem festen Port) und BYE getrieben wird statt von
//! ACTIVATE/DEACTIVATE (§4.5): sobald R sich meldet, entsteht die Sitzung,
//! aber die Ausgangsverbindung zu OAP wird erst bei der ersten Antwort eines
//! Anrufs eroeffnet (anders als T→R/R→S, die beide eifrig vorverbinden).
//! Der per-Komponenten-Steuerkanal bleibt aus API-Einheitlichkeit mit
//! `se`/`iap`/`oap`/`transcriber`/`reasoner` erhalten (§3), wirkt hier aber
//! nur als Backstop: ACTIVATE legt keine Sitzung an (das tut HELLO von
//! selbst), DEACTIVATE reisst eine laufende Sitzung zwangsweise ab falls
//! vorhanden, SHUTDOWN beendet alle und den Prozess.

pub mod call;
pub mod config;

use std::sync::Arc;

use anyhow::Result;
use telefonkern_engine::tts::TtsEngine;
use telefonkern_observability::{HealthState, PipelineMetrics};
use telefonkern_protocol::control::{self, reply_err, reply_ok, ControlCommand};

use call::{BereiteCalls, SessionTable};
use config::SynthesizerConfig;

pub struct Server {
    config: Arc<SynthesizerConfig>,
    sitzungen: SessionTable,
    bereite_calls: BereiteCalls,
    tts: TtsEngine,
    metrics: PipelineMetrics,
    health: HealthState,
}

impl Server {
    pub fn neu(
        config: SynthesizerConfig,
        tts: TtsEngine,
        metrics: PipelineMetrics,
        health: HealthState,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sitzungen: call::neue_sitzungstabelle(),
            bereite_calls: call::neue_bereite_calls(),
            tts,
            metrics,
            health,
        }
    }

    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    /// Synthetisiert die Aufwaerm-Phrasen, startet dann Annahme- und
    /// Registrierungsschleife als Hintergrund-Tasks und laeuft bis
    /// `SHUTDOWN` auf dem Steuerkanal ankommt (§4.5).
    pub async fn starten(self) -> Result<()> {
        let Self {
            config,
            sitzungen,
            bereite_calls,
            tts,
            metrics,
            health,
        } = self;

        tracing::info!(
            socket = %config.steuerung.socket_pfad,
            tcp_port = config.ports.synthesizer_tcp_port,
            udp_port = config.ports.synthesizer_udp_port,
            "Synthesizer startet"
        );

        call::warmlaufen(&tts, &config.synthese.warmup_phrasen, &config.synthese.voice).await;
        tracing::info!("Aufwaerm-Synthese abgeschlossen");

        tokio::spawn(call::annahme_schleife(
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            Arc::clone(&bereite_calls),
            tts,
            metrics.clone(),
        ));

        tokio::spawn(call::registrierungs_schleife(
            Arc::clone(&config),
            Arc::clone(&bereite_calls),
        ));

        control::serve(&config.steuerung.socket_pfad, move |cmd| {
            handle_command(cmd, &sitzungen, &metrics, &health)
        })
        .await?;

        Ok(())
    }
}

fn handle_command(
    cmd: ControlCommand,
    sitzungen: &SessionTable,
    metrics: &PipelineMetrics,
    health: &HealthState,
) -> String {
    match cmd {
        ControlCommand::Activate(call_id) => {
            // Sitzungen entstehen aus HELLO, nicht aus ACTIVATE (§4.5). Ein
            // ACTIVATE fuer eine bereits laufende Sitzung ist harmlos; fuer
            // eine noch nicht verbundene ist es ein No-Op.
            tracing::debug!(
                call_id = call_id.inner(),
                "ACTIVATE ist fuer S nur Hinweis, keine Aktion"
            );
            reply_ok()
        }
        ControlCommand::Deactivate(call_id) => {
            let c = call_id.inner();
            match sitzungen.remove(&c) {
                Some((_, session)) => {
                    session.stop();
                    health.session_count_setzen(sitzungen.len() as u64);
                    metrics.active_sessions.set(sitzungen.len() as f64);
                    tracing::info!(call_id = c, "Sitzung per DEACTIVATE zwangsweise abgebaut");
                    reply_ok()
                }
                None => reply_err("Sitzung nicht aktiv"),
            }
        }
        ControlCommand::Shutdown => {
            for entry in sitzungen.iter() {
                entry.value().stop();
            }
            sitzungen.clear();
            tracing::info!("Synthesizer faehrt herunter");
            reply_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_ist_no_op() {
        let sitzungen = call::neue_sitzungstabelle();
        let metrics = PipelineMetrics::neu().unwrap();
        let health = HealthState::neu();
        let reply = handle_command(
            ControlCommand::Activate(telefonkern_core::types::CallId(1)),
            &sitzungen,
            &metrics,
            &health,
        );
        assert_eq!(reply, "OK");
        assert!(sitzungen.is_empty());
    }

    #[test]
    fn unbekannte_deaktivierung_meldet_fehler() {
        let sitzungen = call::neue_sitzungstabelle();
        let metrics = PipelineMetrics::neu().unwrap();
        let health = HealthState::neu();
        let reply = handle_command(
            ControlCommand::Deactivate(telefonkern_core::types::CallId(999)),
            &sitzungen,
            &metrics,
            &health,
        );
        assert_eq!(reply, "ERR: Sitzung nicht aktiv");
    }

    #[test]
    fn shutdown_leert_die_tabelle_auch_wenn_leer() {
        let sitzungen = call::neue_sitzungstabelle();
        let metrics = PipelineMetrics::neu().unwrap();
        let health = HealthState::neu();
        let reply = handle_command(ControlCommand::Shutdown, &sitzungen, &metrics, &health);
        assert_eq!(reply, "OK");
        assert!(sitzungen.is_empty());
    }
}
