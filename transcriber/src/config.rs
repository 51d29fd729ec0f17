//! Transcriber-Konfiguration

use serde::{Deserialize, Serialize};
use telefonkern_protocol::PortPlan;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TranscriberConfig {
    pub steuerung: SteuerungEinstellungen,
    pub ports: PortPlan,
    pub registrierung: RegistrierungEinstellungen,
    pub sitzung: SitzungEinstellungen,
    pub datenbank: DatenbankEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

impl TranscriberConfig {
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        telefonkern_core::load_toml_config(pfad)
    }
}

/// Der Steuerkanal ist hier nur ein Backstop (§4.3): T's eigentlicher
/// Lebenszyklus folgt HELLO/BYE ueber UDP-Registrierung/TCP, nicht
/// ACTIVATE/DEACTIVATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteuerungEinstellungen {
    pub socket_pfad: String,
}

impl Default for SteuerungEinstellungen {
    fn default() -> Self {
        Self {
            socket_pfad: "/tmp/telefonkern_transcriber.sock".into(),
        }
    }
}

/// Wo IAP und R erreichbar sind (§4.3, §4.7). Ports selbst kommen aus
/// `ports: PortPlan`; nur die Hosts sind hier konfigurierbar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrierungEinstellungen {
    pub iap_host: String,
    pub reasoner_host: String,
}

impl Default for RegistrierungEinstellungen {
    fn default() -> Self {
        Self {
            iap_host: "127.0.0.1".into(),
            reasoner_host: "127.0.0.1".into(),
        }
    }
}

/// Leerlauf-Grenze und Scan-Intervall fuer die Sitzungstabelle (§4.3: 30s
/// Inaktivitaet zerstoert eine Sitzung).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungEinstellungen {
    pub leerlauf_grenze_sekunden: u64,
    pub scan_intervall_sekunden: u64,
}

impl Default for SitzungEinstellungen {
    fn default() -> Self {
        Self {
            leerlauf_grenze_sekunden: 30,
            scan_intervall_sekunden: 5,
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
            port: 9313,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = TranscriberConfig::default();
        assert_eq!(cfg.ports.transcriber_udp_port, 13000);
        assert_eq!(cfg.sitzung.leerlauf_grenze_sekunden, 30);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [registrierung]
            reasoner_host = "10.0.0.9"

            [sitzung]
            leerlauf_grenze_sekunden = 45
        "#;
        let cfg: TranscriberConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.registrierung.reasoner_host, "10.0.0.9");
        assert_eq!(cfg.sitzung.leerlauf_grenze_sekunden, 45);
        assert_eq!(cfg.ports.reasoner_tcp_port, 8083);
    }

    #[test]
    fn datenbank_einstellungen_konvertieren() {
        let e = DatenbankEinstellungen::default();
        let db_cfg: telefonkern_db::DatabaseConfig = (&e).into();
        assert_eq!(db_cfg.url, "sqlite://telefonkern.db");
        assert!(db_cfg.sqlite_wal);
    }
}
