//! Steuerkanal: UNIX-Datagram-Socket pro Komponente
//!
//! Nimmt `ACTIVATE <C>` / `DEACTIVATE <C>` / `SHUTDOWN` vom
//! Anruf-Orchestrator (im SIP-Endpunkt) entgegen. Antworten sind
//! menschenlesbare Einzeiler; Exit-Codes werden hier nicht verwendet.

use std::io;
use std::path::Path;
use telefonkern_core::types::CallId;
use tokio::net::UnixDatagram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Activate(CallId),
    Deactivate(CallId),
    Shutdown,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("ACTIVATE") => {
                let call_id = parts
                    .next()
                    .ok_or_else(|| "ACTIVATE erwartet eine Call-ID".to_string())?
                    .parse::<CallId>()
                    .map_err(|e| format!("ungueltige Call-ID: {e}"))?;
                Ok(Self::Activate(call_id))
            }
            Some("DEACTIVATE") => {
                let call_id = parts
                    .next()
                    .ok_or_else(|| "DEACTIVATE erwartet eine Call-ID".to_string())?
                    .parse::<CallId>()
                    .map_err(|e| format!("ungueltige Call-ID: {e}"))?;
                Ok(Self::Deactivate(call_id))
            }
            Some("SHUTDOWN") => Ok(Self::Shutdown),
            Some(other) => Err(format!("unbekannter Befehl: {other}")),
            None => Err("leerer Befehl".to_string()),
        }
    }

    pub fn format(&self) -> String {
        match self {
            Self::Activate(c) => format!("ACTIVATE {c}"),
            Self::Deactivate(c) => format!("DEACTIVATE {c}"),
            Self::Shutdown => "SHUTDOWN".to_string(),
        }
    }
}

pub fn reply_ok() -> String {
    "OK".to_string()
}

pub fn reply_err(grund: impl std::fmt::Display) -> String {
    format!("ERR: {grund}")
}

/// Startet einen blockierenden Empfangs-Loop auf dem gegebenen Pfad.
/// `handler` entscheidet ueber die Antwortzeile; `SHUTDOWN` beendet den
/// Loop nach der Antwort.
pub async fn serve<F>(socket_path: impl AsRef<Path>, mut handler: F) -> io::Result<()>
where
    F: FnMut(ControlCommand) -> String,
{
    let path = socket_path.as_ref();
    let _ = std::fs::remove_file(path);
    let socket = UnixDatagram::bind(path)?;
    tracing::info!(pfad = %path.display(), "Steuer-Socket gebunden");

    let mut buf = [0u8; 256];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let line = String::from_utf8_lossy(&buf[..len]);
        let command = ControlCommand::parse(&line);
        let (reply, shutdown) = match command {
            Ok(cmd) => {
                let is_shutdown = matches!(cmd, ControlCommand::Shutdown);
                (handler(cmd), is_shutdown)
            }
            Err(grund) => (reply_err(grund), false),
        };
        if let Some(addr) = peer.as_pathname() {
            let _ = socket.send_to(reply.as_bytes(), addr).await;
        }
        if shutdown {
            tracing::info!("Steuer-Socket beendet sich nach SHUTDOWN");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_parsing() {
        assert_eq!(
            ControlCommand::parse("ACTIVATE 42"),
            Ok(ControlCommand::Activate(CallId(42)))
        );
    }

    #[test]
    fn deactivate_parsing() {
        assert_eq!(
            ControlCommand::parse("DEACTIVATE 7"),
            Ok(ControlCommand::Deactivate(CallId(7)))
        );
    }

    #[test]
    fn shutdown_parsing() {
        assert_eq!(ControlCommand::parse("SHUTDOWN"), Ok(ControlCommand::Shutdown));
    }

    #[test]
    fn fehlende_call_id() {
        assert!(ControlCommand::parse("ACTIVATE").is_err());
    }

    #[test]
    fn unbekannter_befehl() {
        assert!(ControlCommand::parse("FOO 1").is_err());
    }

    #[test]
    fn format_round_trip() {
        let cmd = ControlCommand::Activate(CallId(5));
        assert_eq!(ControlCommand::parse(&cmd.format()), Ok(cmd));
    }

    #[test]
    fn antworten_sind_menschenlesbar() {
        assert_eq!(reply_ok(), "OK");
        assert_eq!(reply_err("Ring voll"), "ERR: Ring voll");
    }
}
