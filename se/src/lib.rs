//! se – Bibliotheks-Root
//!
//! Der SIP-Endpunkt haelt pro Anruf zwei Shared-Memory-Ringe und einen
//! RTP-Socket; der Orchestrator (ausserhalb dieses Scopes, §1) steuert den
//! Lebenszyklus ueber ACTIVATE/DEACTIVATE/SHUTDOWN auf einem UNIX-Datagram-
//! Socket.

pub mod call;
pub mod config;
pub mod rtp;

use anyhow::Result;
use telefonkern_core::types::CallId;
use telefonkern_observability::{HealthState, PipelineMetrics};
use telefonkern_protocol::control::{self, reply_err, reply_ok, ControlCommand};

use call::CallTable;
use config::SeConfig;

pub struct Server {
    config: SeConfig,
    anrufe: CallTable,
    metrics: PipelineMetrics,
    health: HealthState,
}

impl Server {
    pub fn neu(config: SeConfig, metrics: PipelineMetrics, health: HealthState) -> Self {
        Self {
            config,
            anrufe: call::neue_call_tabelle(),
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

    /// Laeuft bis `SHUTDOWN` auf dem Steuerkanal ankommt.
    pub async fn starten(self) -> Result<()> {
        let Self {
            config,
            anrufe,
            metrics,
            health,
        } = self;

        tracing::info!(
            socket = %config.steuerung.socket_pfad,
            rtp_port_base = config.rtp.port_base,
            "SE startet"
        );

        control::serve(&config.steuerung.socket_pfad, move |cmd| {
            handle_command(cmd, &config, &anrufe, &metrics, &health)
        })
        .await?;

        Ok(())
    }
}

fn handle_command(
    cmd: ControlCommand,
    config: &SeConfig,
    anrufe: &CallTable,
    metrics: &PipelineMetrics,
    health: &HealthState,
) -> String {
    match cmd {
        ControlCommand::Activate(call_id) => {
            let c = call_id.inner();
            if anrufe.contains_key(&c) {
                return reply_err("Anruf bereits aktiv");
            }
            match call::activate(c, &config.rtp, &config.ring, metrics.clone()) {
                Ok(active) => {
                    anrufe.insert(c, active);
                    health.session_count_setzen(anrufe.len() as u64);
                    health.ring_count_setzen(anrufe.len() as u64 * 2);
                    metrics.active_sessions.set(anrufe.len() as f64);
                    tracing::info!(call_id = c, "Anruf aktiviert");
                    reply_ok()
                }
                Err(e) => {
                    tracing::warn!(call_id = c, fehler = %e, "Aktivierung fehlgeschlagen");
                    reply_err(e)
                }
            }
        }
        ControlCommand::Deactivate(call_id) => {
            let c = call_id.inner();
            match anrufe.remove(&c) {
                Some((_, active)) => {
                    active.stop();
                    health.session_count_setzen(anrufe.len() as u64);
                    health.ring_count_setzen(anrufe.len() as u64 * 2);
                    metrics.active_sessions.set(anrufe.len() as f64);
                    tracing::info!(call_id = c, "Anruf deaktiviert");
                    reply_ok()
                }
                None => reply_err("Anruf nicht aktiv"),
            }
        }
        ControlCommand::Shutdown => {
            for entry in anrufe.iter() {
                entry.value().stop();
            }
            anrufe.clear();
            tracing::info!("SE faehrt herunter");
            reply_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbekannte_deaktivierung_meldet_fehler() {
        let anrufe = call::neue_call_tabelle();
        let metrics = PipelineMetrics::neu().unwrap();
        let health = HealthState::neu();
        let config = SeConfig::default();
        let reply = handle_command(
            ControlCommand::Deactivate(CallId(999)),
            &config,
            &anrufe,
            &metrics,
            &health,
        );
        assert_eq!(reply, "ERR: Anruf nicht aktiv");
    }

    #[test]
    fn shutdown_leert_die_tabelle_auch_wenn_leer() {
        let anrufe = call::neue_call_tabelle();
        let metrics = PipelineMetrics::neu().unwrap();
        let health = HealthState::neu();
        let config = SeConfig::default();
        let reply = handle_command(ControlCommand::Shutdown, &config, &anrufe, &metrics, &health);
        assert_eq!(reply, "OK");
        assert!(anrufe.is_empty());
    }
}
