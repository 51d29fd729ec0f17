//! IAP-Konfiguration

use serde::{Deserialize, Serialize};
use telefonkern_audio::VadConfig;
use telefonkern_protocol::PortPlan;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IapConfig {
    pub steuerung: SteuerungEinstellungen,
    pub ports: PortPlan,
    pub registrierung: RegistrierungEinstellungen,
    pub vad: VadEinstellungen,
    pub ring: RingEinstellungen,
    pub warteschlange: WarteschlangeEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

impl IapConfig {
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
            socket_pfad: "/tmp/telefonkern_iap.sock".into(),
        }
    }
}

/// Wohin die UDP-REGISTER/BYE-Pakete fuer T gehen (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrierungEinstellungen {
    pub transcriber_host: String,
}

impl Default for RegistrierungEinstellungen {
    fn default() -> Self {
        Self {
            transcriber_host: "127.0.0.1".into(),
        }
    }
}

/// Serialisierbares Gegenstueck zu `telefonkern_audio::VadConfig` (die
/// Original-Struct traegt kein `Serialize`, da sie reiner Laufzeit-Zustand
/// im Audio-Crate ist).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VadEinstellungen {
    pub threshold: f32,
    pub start_threshold: f32,
    pub stop_threshold: f32,
    pub hangover_ms: u32,
    pub pre_roll_ms: u32,
    pub overlap_ms: u32,
    pub min_chunk_ms: u32,
    pub max_chunk_ms: u32,
}

impl Default for VadEinstellungen {
    fn default() -> Self {
        let d = VadConfig::default();
        Self {
            threshold: d.threshold,
            start_threshold: d.start_threshold,
            stop_threshold: d.stop_threshold,
            hangover_ms: d.hangover_ms,
            pre_roll_ms: d.pre_roll_ms,
            overlap_ms: d.overlap_ms,
            min_chunk_ms: d.min_chunk_ms,
            max_chunk_ms: d.max_chunk_ms,
        }
    }
}

impl From<VadEinstellungen> for VadConfig {
    fn from(v: VadEinstellungen) -> Self {
        VadConfig {
            threshold: v.threshold,
            start_threshold: v.start_threshold,
            stop_threshold: v.stop_threshold,
            hangover_ms: v.hangover_ms,
            pre_roll_ms: v.pre_roll_ms,
            overlap_ms: v.overlap_ms,
            min_chunk_ms: v.min_chunk_ms,
            max_chunk_ms: v.max_chunk_ms,
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

/// Lokale TCP-Warteschlange zwischen VAD-Thread und Schreiber-Thread (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WarteschlangeEinstellungen {
    pub kapazitaet: usize,
}

impl Default for WarteschlangeEinstellungen {
    fn default() -> Self {
        Self { kapazitaet: 16 }
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
            port: 9311,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = IapConfig::default();
        assert_eq!(cfg.ports.iap_audio_base, 9001);
        assert_eq!(cfg.vad.threshold, 0.02);
        assert_eq!(cfg.warteschlange.kapazitaet, 16);
    }

    #[test]
    fn vad_einstellungen_entsprechen_audio_standard() {
        let v: VadConfig = VadEinstellungen::default().into();
        assert_eq!(v, VadConfig::default());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [vad]
            threshold = 0.03

            [warteschlange]
            kapazitaet = 32
        "#;
        let cfg: IapConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.vad.threshold, 0.03);
        assert_eq!(cfg.warteschlange.kapazitaet, 32);
        assert_eq!(cfg.ports.transcriber_udp_port, 13000);
    }
}
