//! transcriber – Bibliotheks-Root
//!
//! Der Transcriber haelt eine Sitzungstabelle, die von REGISTER/HELLO und
//! BYE getrieben wird statt von ACTIVATE/DEACTIVATE (§4.3): IAP registriert
//! sich per UDP, der Transcriber waehlt sich daraufhin selbst bei IAP ein
//! und eroeffnet eifrig eine Ausgangsverbindung zu R. Der per-Komponenten-
//! Steuerkanal bleibt aus API-Einheitlichkeit mit `se`/`iap`/`oap` erhalten
//! (§3), wirkt hier aber nur als Backstop: ACTIVATE legt keine Sitzung an
//! (das tut REGISTER von selbst), DEACTIVATE reisst eine laufende Sitzung
//! zwangsweise ab falls vorhanden, SHUTDOWN beendet alle und den Prozess.

pub mod call;
pub mod config;

use std::sync::Arc;

use anyhow::Result;
use telefonkern_db::SqliteDb;
use telefonkern_engine::asr::AsrEngine;
use telefonkern_observability::{HealthState, PipelineMetrics};
use telefonkern_protocol::control::{self, reply_err, reply_ok, ControlCommand};

use call::SessionTable;
use config::TranscriberConfig;

pub struct Server {
    config: Arc<TranscriberConfig>,
    sitzungen: SessionTable,
    asr: AsrEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
    health: HealthState,
}

impl Server {
    pub fn neu(
        config: TranscriberConfig,
        asr: AsrEngine,
        db: Arc<SqliteDb>,
        metrics: PipelineMetrics,
        health: HealthState,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sitzungen: call::neue_sitzungstabelle(),
            asr,
            db,
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

    /// Laeuft bis `SHUTDOWN` auf dem Steuerkanal ankommt. Startet daneben
    /// die REGISTER-Annahme und den Leerlauf-Waechter als Hintergrund-Tasks,
    /// die den eigentlichen Sitzungslebenszyklus treiben (§4.3).
    pub async fn starten(self) -> Result<()> {
        let Self {
            config,
            sitzungen,
            asr,
            db,
            metrics,
            health,
        } = self;

        tracing::info!(
            socket = %config.steuerung.socket_pfad,
            udp_port = config.ports.transcriber_udp_port,
            "Transcriber startet"
        );

        tokio::spawn(call::registrierungs_schleife(
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            asr,
            Arc::clone(&db),
            metrics.clone(),
        ));

        tokio::spawn(call::leerlauf_waechter(
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            Arc::clone(&db),
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
            // Sitzungen entstehen aus REGISTER, nicht aus ACTIVATE (§4.3).
            // Ein ACTIVATE fuer eine bereits laufende Sitzung ist harmlos;
            // fuer eine noch nicht registrierte ist es ein No-Op.
            tracing::debug!(call_id = call_id.inner(), "ACTIVATE ist fuer T nur Hinweis, keine Aktion");
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
            tracing::info!("Transcriber faehrt herunter");
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
