//! Call-Identifikation
//!
//! Jeder Anruf traegt eine nicht-negative ganzzahlige ID `C`, die als
//! Routing-Schluessel durch die gesamte Pipeline gereicht wird (Ports,
//! Shared-Memory-Ring-Namen, TCP-HELLO-Payload, UDP-Registrierung).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Eindeutige Anruf-ID. Newtype um versehentliches Vertauschen mit
/// anderen u32-Groessen (Ports, Ticks, ...) zur Compilezeit auszuschliessen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub u32);

impl CallId {
    pub fn new(wert: u32) -> Self {
        Self(wert)
    }

    pub fn inner(&self) -> u32 {
        self.0
    }

    /// Name des eingehenden Shared-Memory-Rings fuer diesen Anruf.
    pub fn shm_ring_eingehend(&self) -> String {
        format!("/ap_in_{}", self.0)
    }

    /// Name des ausgehenden Shared-Memory-Rings fuer diesen Anruf.
    pub fn shm_ring_ausgehend(&self) -> String {
        format!("/ap_out_{}", self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CallId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(CallId)
    }
}

impl From<u32> for CallId {
    fn from(wert: u32) -> Self {
        Self(wert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shm_namen() {
        let c = CallId(42);
        assert_eq!(c.shm_ring_eingehend(), "/ap_in_42");
        assert_eq!(c.shm_ring_ausgehend(), "/ap_out_42");
    }

    #[test]
    fn display_ist_dezimal() {
        assert_eq!(CallId(7).to_string(), "7");
    }

    #[test]
    fn from_str_parst_ascii_dezimal() {
        let c: CallId = "123".parse().unwrap();
        assert_eq!(c, CallId(123));
    }

    #[test]
    fn from_str_trimmt_whitespace() {
        let c: CallId = "  99 ".parse().unwrap();
        assert_eq!(c, CallId(99));
    }

    #[test]
    fn from_str_lehnt_nicht_numerisches_ab() {
        assert!("abc".parse::<CallId>().is_err());
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let c = CallId(5);
        let json = serde_json::to_string(&c).unwrap();
        let c2: CallId = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }
}
