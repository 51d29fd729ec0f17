//! telefonkern-db – Anruf-Log und Konfigurations-Key/Value-Speicher
//!
//! Ein einzelner eingebetteter SQLite-Speicher (WAL-Modus) hinter zwei
//! schmalen Repository-Traits: das Append-only-Anruf-Log und der
//! Konfigurations-KV-Speicher. Kein Code auf dem Anruf-Hot-Path blockiert
//! auf diesem Speicher.
//!
//! # Verwendung
//!
//! ```no_run
//! use telefonkern_db::{SqliteDb, repository::{CallLogRepository, DatabaseConfig}};
//! use telefonkern_db::models::NeuerCallLog;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cfg = DatabaseConfig::default();
//!     let db = SqliteDb::oeffnen(&cfg).await.unwrap();
//!
//!     db.start_call(NeuerCallLog {
//!         call_id: 1,
//!         caller_number: Some("+491701234567"),
//!         start_ts: chrono::Utc::now(),
//!     }).await.unwrap();
//! }
//! ```

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::DbError;
pub use repository::{
    CallLogRepository, ConfigRepository, DatabaseBackend, DatabaseConfig, DbResult,
};
pub use sqlite::SqliteDb;
