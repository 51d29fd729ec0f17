//! reasoner – Bibliotheks-Root
//!
//! Der Reasoner haelt eine Sitzungstabelle, die von HELLO (T's eingehende
//! TCP-Verbindung auf dem festen Port) und BYE getrieben wird statt von
//! ACTIVATE/DEACTIVATE (§4.4): sobald T sich meldet, eroeffnet R eifrig eine
//! Ausgangsverbindung zu S. Der per-Komponenten-Steuerkanal bleibt aus
//! API-Einheitlichkeit mit `se`/`iap`/`oap`/`transcriber` erhalten (§3),
//! wirkt hier aber nur als Backstop: ACTIVATE legt keine Sitzung an (das tut
//! HELLO von selbst), DEACTIVATE reisst eine laufende Sitzung zwangsweise ab
//! falls vorhanden, SHUTDOWN beendet alle und den Prozess.

pub mod call;
pub mod config;

use std::sync::Arc;

use anyhow::Result;
use telefonkern_db::SqliteDb;
use telefonkern_engine::llm::LlmEngine;
use telefonkern_observability::{HealthState, PipelineMetrics};
use telefonkern_protocol::control::{self, reply_err, reply_ok, ControlCommand};

use call::SessionTable;
use config::ReasonerConfig;

pub struct Server {
    config: Arc<ReasonerConfig>,
    sitzungen: SessionTable,
    llm: LlmEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
    health: HealthState,
}

impl Server {
    pub fn neu(
        config: ReasonerConfig,
        llm: LlmEngine,
        db: Arc<SqliteDb>,
        metrics: PipelineMetrics,
        health: HealthState,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sitzungen: call::neue_sitzungstabelle(),
            llm,
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

    /// Laeuft bis `SHUTDOWN` auf dem Steuerkanal ankommt. Startet daneben die
    /// Annahme-Schleife fuer T's TCP-Verbindungen und den Leerlauf-Waechter
    /// als Hintergrund-Tasks, die den eigentlichen Sitzungslebenszyklus
    /// treiben (§4.4).
    pub async fn starten(self) -> Result<()> {
        let Self {
            config,
            sitzungen,
            llm,
            db,
            metrics,
            health,
        } = self;

        tracing::info!(
            socket = %config.steuerung.socket_pfad,
            tcp_port = config.ports.reasoner_tcp_port,
            "Reasoner startet"
        );

        tokio::spawn(call::annahme_schleife(
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            llm.clone(),
            Arc::clone(&db),
            metrics.clone(),
        ));

        tokio::spawn(call::leerlauf_waechter(
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            llm,
            Arc::clone(&db),
            metrics.clone(),
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
            // Sitzungen entstehen aus HELLO, nicht aus ACTIVATE (§4.4). Ein
            // ACTIVATE fuer eine bereits laufende Sitzung ist harmlos; fuer
            // eine noch nicht verbundene ist es ein No-Op.
            tracing::debug!(
                call_id = call_id.inner(),
                "ACTIVATE ist fuer R nur Hinweis, keine Aktion"
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
            tracing::info!("Reasoner faehrt herunter");
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
