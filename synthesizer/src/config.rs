//! Synthesizer-Konfiguration

use serde::{Deserialize, Serialize};
use telefonkern_protocol::PortPlan;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SynthesizerConfig {
    pub steuerung: SteuerungEinstellungen,
    pub ports: PortPlan,
    pub registrierung: RegistrierungEinstellungen,
    pub synthese: SyntheseEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

impl SynthesizerConfig {
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        telefonkern_core::load_toml_config(pfad)
    }
}

/// Der Steuerkanal ist hier nur ein Backstop (§4.5): S's eigentlicher
/// Lebenszyklus folgt HELLO/BYE ueber die TCP-Verbindung von R, nicht
/// ACTIVATE/DEACTIVATE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteuerungEinstellungen {
    pub socket_pfad: String,
}

impl Default for SteuerungEinstellungen {
    fn default() -> Self {
        Self {
            socket_pfad: "/tmp/telefonkern_synthesizer.sock".into(),
        }
    }
}

/// Wohin S sich bei der ersten Antwort eines Anrufs verbindet (§4.5, §4.7).
/// Der Port selbst kommt aus `ports: PortPlan`; nur der Host ist hier
/// konfigurierbar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrierungEinstellungen {
    pub oap_host: String,
}

impl Default for RegistrierungEinstellungen {
    fn default() -> Self {
        Self {
            oap_host: "127.0.0.1".into(),
        }
    }
}

/// Stimme, Subchunk-Groesse (960 Samples @ 24 kHz ≈ 40 ms, §4.5) und die
/// Aufwaerm-Phrasen, die beim Start synthetisiert und verworfen werden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheseEinstellungen {
    pub voice: String,
    pub subchunk_samples: usize,
    pub warmup_phrasen: Vec<String>,
}

impl Default for SyntheseEinstellungen {
    fn default() -> Self {
        Self {
            voice: "default".into(),
            subchunk_samples: 960,
            warmup_phrasen: vec![
                "Hello.".into(),
                "One moment please.".into(),
                "Thank you for calling.".into(),
            ],
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
            port: 9315,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = SynthesizerConfig::default();
        assert_eq!(cfg.ports.synthesizer_tcp_port, 8090);
        assert_eq!(cfg.synthese.subchunk_samples, 960);
        assert_eq!(cfg.synthese.warmup_phrasen.len(), 3);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [registrierung]
            oap_host = "10.0.0.9"

            [synthese]
            voice = "narrator"
        "#;
        let cfg: SynthesizerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.registrierung.oap_host, "10.0.0.9");
        assert_eq!(cfg.synthese.voice, "narrator");
        assert_eq!(cfg.ports.oap_audio_base, 9002);
    }
}
