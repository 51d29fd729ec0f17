//! telefonkern-core – Gemeinsame Typen, Fehlertypen und Konfigurations-Helfer
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen telefonkern-Crates (Protokoll, Audio, Engine, DB, Observability)
//! und allen sechs Komponenten-Binaries gemeinsam genutzt werden.

pub mod config;
pub mod error;
pub mod types;

pub use config::load_toml_config;
pub use error::{PipelineError, Result};
pub use types::CallId;
