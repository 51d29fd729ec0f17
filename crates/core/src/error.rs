//! Fehlertaxonomie fuer telefonkern
//!
//! Spiegelt die Fehlerklassen wider, die jede der sechs Komponenten
//! behandeln muss: transiente I/O, Flusskontrolle, Protokollverletzungen,
//! Peer-Liveness, Inferenzfehler, logische Stornierung und fatale Fehler.
//! Untermodule (protocol, audio, engine, db) definieren eigene, engere
//! Fehler-Enums und konvertieren per `#[from]` hierher, wo ein
//! gemeinsamer Typ ueber Crate-Grenzen hinweg gebraucht wird.

use thiserror::Error;

/// Gemeinsamer Result-Alias
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fehler, die waehrend des Betriebs einer Pipeline-Komponente auftreten koennen
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transiente I/O: TCP-Connect abgelehnt, UDP-Send EAGAIN. Wird per
    /// Retry-Policy behandelt, siehe `protocol::retry`.
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    /// Flusskontrolle: Ring voll, interne Queue voll. Wird durch
    /// Drop-Policy am Aufrufer behandelt, nie hier blockierend.
    #[error("Ueberlauf: {0}")]
    Ueberlauf(String),

    /// Protokollverletzung: ungueltiges HELLO, unbekannte Framing-Laenge.
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Peer-Liveness: Heartbeat laenger als das Staleness-Fenster ueberfaellig.
    #[error("Peer inaktiv (call={call_id}): letzter Herzschlag vor {seit_ms} ms")]
    PeerInaktiv { call_id: u32, seit_ms: u64 },

    /// Inferenzfehler: ASR/LLM/TTS-Primitive ist fehlgeschlagen.
    #[error("Inferenzfehler (call={call_id}): {grund}")]
    Inferenz { call_id: u32, grund: String },

    /// Logische Stornierung: BYE oder fehlende Session. Kein echter
    /// Fehler im Sinne einer Stoerung, aber an den Aufrufer zu melden
    /// damit kein nachgelagertes Ergebnis mehr erzeugt wird.
    #[error("Storniert (call={call_id})")]
    Storniert { call_id: u32 },

    /// Konfigurationsfehler beim Laden/Validieren.
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// Interner Fehler ohne spezifischere Kategorie.
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    pub fn inferenz(call_id: u32, grund: impl Into<String>) -> Self {
        Self::Inferenz {
            call_id,
            grund: grund.into(),
        }
    }

    /// Gibt true zurueck wenn sich ein erneuter Versuch lohnen koennte.
    /// Fatale und logische Fehler sind nie wiederholbar.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Verbindung(_) | Self::Io(_))
    }

    /// Gibt true zurueck wenn der Fehler eine Sitzung stillschweigend
    /// beenden soll, statt geloggt und eskaliert zu werden.
    pub fn ist_stornierung(&self) -> bool {
        matches!(self, Self::Storniert { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbindung_ist_wiederholbar() {
        assert!(PipelineError::Verbindung("refused".into()).ist_wiederholbar());
    }

    #[test]
    fn inferenz_ist_nicht_wiederholbar() {
        assert!(!PipelineError::inferenz(42, "timeout").ist_wiederholbar());
    }

    #[test]
    fn storniert_markiert_sich_selbst() {
        let e = PipelineError::Storniert { call_id: 7 };
        assert!(e.ist_stornierung());
        assert!(!e.ist_wiederholbar());
    }

    #[test]
    fn inferenzfehler_enthaelt_call_id() {
        let e = PipelineError::inferenz(99, "Modell abgestuerzt");
        assert!(e.to_string().contains("call=99"));
        assert!(e.to_string().contains("Modell abgestuerzt"));
    }
}
