//! Call-gebundene UDP-Registrierung (Liveness-Ping, keine Lookup-Tabelle)
//!
//! IAP und OAP senden beim Aktivieren eines Anrufs periodisch
//! `REGISTER:<C>` an T bzw. S, bis die erwartete TCP-Verbindung steht;
//! beim Deaktivieren senden sie `BYE:<C>` als Best-Effort. Ports fuer
//! `9001+C`/`9002+C` werden direkt aus `C` berechnet (siehe `ports`) –
//! die Registrierung dient nur als Signal "ich bin bereit", nicht als
//! Adressvermittlung.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use telefonkern_core::types::CallId;
use tokio::net::UdpSocket;

/// Eine geparste Registrierungsnachricht.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMessage {
    Register(CallId),
    Bye(CallId),
}

impl RegistrationMessage {
    pub fn encode(&self) -> String {
        match self {
            Self::Register(c) => format!("REGISTER:{c}"),
            Self::Bye(c) => format!("BYE:{c}"),
        }
    }

    pub fn decode(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("REGISTER:") {
            return rest.parse::<CallId>().ok().map(Self::Register);
        }
        if let Some(rest) = text.strip_prefix("BYE:") {
            return rest.parse::<CallId>().ok().map(Self::Bye);
        }
        None
    }

    pub fn call_id(&self) -> CallId {
        match self {
            Self::Register(c) | Self::Bye(c) => *c,
        }
    }
}

/// Intervall-Plan fuer die Registrierungs-Polling-Schleife aus §4.7:
/// alle 200 ms in der ersten Sekunde, danach jede Sekunde.
pub fn polling_interval(elapsed_ms: u64) -> std::time::Duration {
    if elapsed_ms < 1000 {
        std::time::Duration::from_millis(200)
    } else {
        std::time::Duration::from_secs(1)
    }
}

/// Sendet `REGISTER:<C>` im §4.7-Takt (200 ms/1 s), bis `stop` gesetzt wird
/// oder die erwartete TCP-Verbindung ankommt. Gemeinsame Schleife fuer IAP
/// (Ziel: T auf Port 13000) und OAP (Ziel: S auf Port 13001); beide
/// unterscheiden sich nur im Zielport und wann `stop` gesetzt wird.
pub async fn register_bis_verbunden(socket: &UdpSocket, ziel: SocketAddr, call_id: CallId, stop: &AtomicBool) {
    let start = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        let nachricht = RegistrationMessage::Register(call_id).encode();
        let _ = socket.send_to(nachricht.as_bytes(), ziel).await;
        tokio::time::sleep(polling_interval(start.elapsed().as_millis() as u64)).await;
    }
}

/// Sendet `BYE:<C>` als Best-Effort (§4.7).
pub async fn bye_best_effort(socket: &UdpSocket, ziel: SocketAddr, call_id: CallId) {
    let nachricht = RegistrationMessage::Bye(call_id).encode();
    let _ = socket.send_to(nachricht.as_bytes(), ziel).await;
}
