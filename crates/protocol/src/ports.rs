//! Port-Disziplin (§3, §6, §10)
//!
//! `9001+C` und `9002+C` werden direkt aus der numerischen Call-ID
//! berechnet, keine Registrierung noetig. Die Basiswerte und die
//! festen Ports sind selbst Konfigurationsfelder mit den Spezifikations-
//! werten als Standard, damit ein Deployment sie ohne Code-Aenderung
//! verlegen kann.

use serde::{Deserialize, Serialize};
use telefonkern_core::types::CallId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortPlan {
    /// IAP TCP-Audioserver (Chunks → T): `iap_audio_base + C`
    pub iap_audio_base: u16,
    /// OAP TCP-Audioserver (Audio ← S): `oap_audio_base + C`
    pub oap_audio_base: u16,
    /// T UDP-Registrierungs-Listener (fest)
    pub transcriber_udp_port: u16,
    /// S UDP-Registrierungs-Listener (fest)
    pub synthesizer_udp_port: u16,
    /// T→R Control-TCP (fest)
    pub reasoner_tcp_port: u16,
    /// R→S Control-TCP (fest)
    pub synthesizer_tcp_port: u16,
}

impl Default for PortPlan {
    fn default() -> Self {
        Self {
            iap_audio_base: 9001,
            oap_audio_base: 9002,
            transcriber_udp_port: 13000,
            synthesizer_udp_port: 13001,
            reasoner_tcp_port: 8083,
            synthesizer_tcp_port: 8090,
        }
    }
}

impl PortPlan {
    pub fn iap_audio_port(&self, call_id: CallId) -> u16 {
        self.iap_audio_base + call_id.inner() as u16
    }

    pub fn oap_audio_port(&self, call_id: CallId) -> u16 {
        self.oap_audio_base + call_id.inner() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte_stimmen_mit_spezifikation_ueberein() {
        let plan = PortPlan::default();
        assert_eq!(plan.transcriber_udp_port, 13000);
        assert_eq!(plan.synthesizer_udp_port, 13001);
        assert_eq!(plan.reasoner_tcp_port, 8083);
        assert_eq!(plan.synthesizer_tcp_port, 8090);
    }

    #[test]
    fn call_port_ableitung() {
        let plan = PortPlan::default();
        assert_eq!(plan.iap_audio_port(CallId(42)), 9043);
        assert_eq!(plan.oap_audio_port(CallId(42)), 9044);
    }

    #[test]
    fn relozierbare_basiswerte() {
        let plan = PortPlan {
            iap_audio_base: 20000,
            ..PortPlan::default()
        };
        assert_eq!(plan.iap_audio_port(CallId(1)), 20001);
    }
}
