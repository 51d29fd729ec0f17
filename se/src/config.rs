//! SE-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Prozess ohne Konfigurationsdatei
//! lauffaehig ist (§10).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeConfig {
    pub steuerung: SteuerungEinstellungen,
    pub rtp: RtpEinstellungen,
    pub ring: RingEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

impl SeConfig {
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        telefonkern_core::load_toml_config(pfad)
    }
}

/// Pfad des UNIX-Steuerkanals, auf dem ACTIVATE/DEACTIVATE/SHUTDOWN ankommen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteuerungEinstellungen {
    pub socket_pfad: String,
}

impl Default for SteuerungEinstellungen {
    fn default() -> Self {
        Self {
            socket_pfad: "/tmp/telefonkern_se.sock".into(),
        }
    }
}

/// RTP-Transport-Einstellungen. Die eigentliche SIP/SDP-Aushandlung der
/// Peer-Adresse ist nicht Teil dieser Komponente (§1 Out-of-scope); SE
/// bindet pro Anruf einen UDP-Socket und lernt die Peer-Adresse aus dem
/// ersten empfangenen Paket (symmetrisches RTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpEinstellungen {
    /// Lokaler UDP-Port fuer Anruf `C` ist `port_base + C`.
    pub port_base: u16,
    /// Bind-Adresse fuer die RTP-Sockets.
    pub bind_adresse: String,
    /// Maximale Anzahl Frames, die der Scheduler pro 20ms-Tick aus dem
    /// ausgehenden Ring zieht (§4.1 Burst-Drain).
    pub burst_frames: usize,
}

impl Default for RtpEinstellungen {
    fn default() -> Self {
        Self {
            port_base: 40000,
            bind_adresse: "0.0.0.0".into(),
            burst_frames: 16,
        }
    }
}

/// Geometrie der Shared-Memory-Ringe (§4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RingEinstellungen {
    pub slot_size: u32,
    pub slot_count: u32,
}

impl Default for RingEinstellungen {
    fn default() -> Self {
        Self {
            slot_size: telefonkern_audio::ring::DEFAULT_SLOT_SIZE,
            slot_count: telefonkern_audio::ring::DEFAULT_SLOT_COUNT,
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
            port: 9310,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = SeConfig::default();
        assert_eq!(cfg.rtp.port_base, 40000);
        assert_eq!(cfg.ring.slot_size, 2048);
        assert_eq!(cfg.ring.slot_count, 512);
        assert_eq!(cfg.observability.port, 9310);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [rtp]
            port_base = 41000

            [steuerung]
            socket_pfad = "/tmp/custom.sock"
        "#;
        let cfg: SeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.rtp.port_base, 41000);
        assert_eq!(cfg.steuerung.socket_pfad, "/tmp/custom.sock");
        assert_eq!(cfg.ring.slot_count, 512);
    }
}
