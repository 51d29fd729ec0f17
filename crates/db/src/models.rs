//! Datenbankmodelle fuer telefonkern
//!
//! Reine Datenuebertragungsobjekte, getrennt von den Domain-Typen in
//! `telefonkern-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ein abgeschlossener oder laufender Anruf-Datensatz (§3, §6, §10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogRecord {
    pub call_id: u32,
    pub caller_number: Option<String>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub transcript: Option<String>,
    pub reply_text: Option<String>,
    pub status: String,
}

/// Daten zum Anlegen eines neuen Anrufprotokolls bei HELLO.
#[derive(Debug, Clone)]
pub struct NeuerCallLog<'a> {
    pub call_id: u32,
    pub caller_number: Option<&'a str>,
    pub start_ts: DateTime<Utc>,
}

/// Teilaktualisierung eines laufenden Anrufs (Transkript/Antwort werden
/// fortlaufend angehaengt, nicht ersetzt — siehe `append_transcript`).
#[derive(Debug, Clone, Default)]
pub struct CallLogAbschluss {
    pub end_ts: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Ein Konfigurations-Key/Value-Eintrag (Service-Flags, Modellpfade,
/// Voice-ID, VAD-/Chunk-Tuning-Overrides — §6, §10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
