//! OAP-Konfiguration

use serde::{Deserialize, Serialize};
use telefonkern_protocol::PortPlan;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OapConfig {
    pub steuerung: SteuerungEinstellungen,
    pub ports: PortPlan,
    pub registrierung: RegistrierungEinstellungen,
    pub puffer: PufferEinstellungen,
    pub ring: RingEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

impl OapConfig {
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        telefonkern_core::load_toml_config(pfad)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteuerungEinstellungen {
    pub socket_pfad: String,
}

impl Default for SteuerungEinstellungen {
    fn default() -> Self {
        Self {
            socket_pfad: "/tmp/telefonkern_oap.sock".into(),
        }
    }
}

/// Wohin die UDP-REGISTER/BYE-Pakete fuer S gehen (§4.7).
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

/// `out_buffer`-Verhalten (§4.6): Obergrenze in Frames, und wie lange bei
/// Ueberlauf gewartet wird, bevor aelteste Frames verworfen werden.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PufferEinstellungen {
    pub max_frames: usize,
    pub ueberlauf_gnadenfrist_ms: u64,
    pub burst_frames: usize,
}

impl Default for PufferEinstellungen {
    fn default() -> Self {
        Self {
            max_frames: 10,
            ueberlauf_gnadenfrist_ms: 1000,
            burst_frames: 16,
        }
    }
}

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
            port: 9312,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = OapConfig::default();
        assert_eq!(cfg.ports.oap_audio_base, 9002);
        assert_eq!(cfg.puffer.max_frames, 10);
        assert_eq!(cfg.puffer.ueberlauf_gnadenfrist_ms, 1000);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [puffer]
            max_frames = 20

            [registrierung]
            synthesizer_host = "10.0.0.5"
        "#;
        let cfg: OapConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.puffer.max_frames, 20);
        assert_eq!(cfg.registrierung.synthesizer_host, "10.0.0.5");
        assert_eq!(cfg.ports.synthesizer_udp_port, 13001);
    }
}
