//! Reasoner-Konfiguration

use serde::{Deserialize, Serialize};
use telefonkern_protocol::PortPlan;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReasonerConfig {
    pub steuerung: SteuerungEinstellungen,
    pub ports: PortPlan,
    pub registrierung: RegistrierungEinstellungen,
    pub dialog: DialogEinstellungen,
    pub datenbank: DatenbankEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

impl ReasonerConfig {
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        telefonkern_core::load_toml_config(pfad)
    }
}

/// Der Steuerkanal ist hier nur ein Backstop (§4.4): R's eigentlicher
/// Lebenszyklus folgt HELLO/BYE ueber die TCP-Verbindung von T, nicht
/// ACTIVATE/DEACTIVATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteuerungEinstellungen {
    pub socket_pfad: String,
}

impl Default for SteuerungEinstellungen {
    fn default() -> Self {
        Self {
            socket_pfad: "/tmp/telefonkern_reasoner.sock".into(),
        }
    }
}

/// Wohin R sich eifrig verbindet (§4.7). Der Port selbst kommt aus
/// `ports: PortPlan`; nur der Host ist hier konfigurierbar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrierungEinstellungen {
    pub synthesizer_host: String,
}

impl Default for RegistrierungEinstellungen {
    fn default() -> Self {
        Self {
            synthesizer_host: "127.0.0.1".into(),
        }
    }
}

/// Zug-Erkennung (Satzzeichen- und Stille-Regel), Half-Duplex-Gate und der
/// 30s-Leerlauf-Backstop auf Sitzungsebene (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogEinstellungen {
    pub persona: String,
    pub silence_schwelle_ms: u64,
    pub wache_intervall_ms: u64,
    pub leerlauf_grenze_sekunden: u64,
}

impl Default for DialogEinstellungen {
    fn default() -> Self {
        Self {
            persona: "You are a warm, concise phone assistant.".into(),
            silence_schwelle_ms: 1500,
            wache_intervall_ms: 250,
            leerlauf_grenze_sekunden: 30,
        }
    }
}

/// Eigene serialisierbare Huelle um `telefonkern_db::DatabaseConfig`, das
/// selbst kein `Serialize`/`Deserialize` traegt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatenbankEinstellungen {
    pub url: String,
    pub max_verbindungen: u32,
    pub sqlite_wal: bool,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            url: "sqlite://telefonkern.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

impl From<&DatenbankEinstellungen> for telefonkern_db::DatabaseConfig {
    fn from(e: &DatenbankEinstellungen) -> Self {
        Self {
            backend: telefonkern_db::DatabaseBackend::Sqlite,
            url: e.url.clone(),
            max_verbindungen: e.max_verbindungen,
            sqlite_wal: e.sqlite_wal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    pub level: String,
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    pub aktiviert: bool,
    pub bind_adresse: String,
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "0.0.0.0".into(),
            port: 9314,
        }
    }
}
