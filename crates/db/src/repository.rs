//! Repository-Trait-Definitionen
//!
//! Zwei Repositories hinter einem schmalen Trait, konsistent mit dem
//! Rest dieser Pipeline: ein Anruf-Log (Append-only, geschrieben von R
//! und T) und ein Konfigurations-KV-Speicher (gelesen beim Start und auf
//! einem langsamen Poll, nie auf dem Pro-Chunk-Hot-Path).

use crate::models::{CallLogAbschluss, CallLogRecord, ConfigEntry, NeuerCallLog};

pub type DbResult<T> = Result<T, crate::error::DbError>;

/// Unterstuetzte Datenbank-Backends. Nur SQLite ist implementiert; das Feld
/// bleibt als Erweiterungspunkt, falls ein Multi-Instance-Betrieb spaeter
/// Postgres braucht.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// Verbindungs-URL, z. B. "sqlite://telefonkern.db"
    pub url: String,
    pub max_verbindungen: u32,
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite://telefonkern.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Append-only Anruf-Log: `call_id, caller_number, start_ts, end_ts,
/// transcript, reply_text, status` (§3, §6).
#[allow(async_fn_in_trait)]
pub trait CallLogRepository: Send + Sync {
    /// Legt den Datensatz bei HELLO an (`status = "active"`).
    async fn start_call(&self, neu: NeuerCallLog<'_>) -> DbResult<CallLogRecord>;

    /// Haengt Transkript-Text an (nie ersetzend — T liefert inkrementelle Deltas).
    async fn append_transcript(&self, call_id: u32, delta: &str) -> DbResult<()>;

    /// Haengt Antworttext an (R liefert eine Antwort pro Turn).
    async fn append_reply(&self, call_id: u32, text: &str) -> DbResult<()>;

    /// Schliesst den Anruf ab (BYE oder Fehlerpfad).
    async fn finish_call(&self, call_id: u32, abschluss: CallLogAbschluss) -> DbResult<()>;

    /// Laedt den aktuellen Datensatz (fuer Tests und Diagnose).
    async fn load(&self, call_id: u32) -> DbResult<Option<CallLogRecord>>;
}

/// Konfigurations-KV-Speicher: Service-Enablement-Flags, Modellpfade,
/// Voice-ID, VAD-/Chunk-Tuning-Overrides (§6, §10).
#[allow(async_fn_in_trait)]
pub trait ConfigRepository: Send + Sync {
    async fn get(&self, key: &str) -> DbResult<Option<ConfigEntry>>;
    async fn set(&self, key: &str, value: &str) -> DbResult<ConfigEntry>;
    async fn all(&self) -> DbResult<Vec<ConfigEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_standard() {
        let cfg = DatabaseConfig::default();
        assert_eq!(cfg.backend, DatabaseBackend::Sqlite);
        assert!(cfg.sqlite_wal);
        assert_eq!(cfg.max_verbindungen, 5);
        assert_eq!(cfg.url, "sqlite://telefonkern.db");
    }

    #[test]
    fn backend_anzeige() {
        assert_eq!(DatabaseBackend::Sqlite.to_string(), "SQLite");
    }
}
