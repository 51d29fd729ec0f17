//! SQLite-Backend-Implementierungen fuer Anruf-Log und Konfigurations-KV

pub mod call_log;
pub mod config_kv;
pub mod pool;

pub use pool::SqliteDb;
