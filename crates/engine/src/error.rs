//! Fehlertypen fuer die ASR/LLM/TTS-Primitive

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ASR-Fehler bei Anruf {call_id}: {grund}")]
    Asr { call_id: u32, grund: String },

    #[error("LLM-Fehler bei Anruf {call_id}: {grund}")]
    Llm { call_id: u32, grund: String },

    #[error("TTS-Fehler bei Anruf {call_id}: {grund}")]
    Tts { call_id: u32, grund: String },

    #[error("Engine-Hintergrundaufgabe abgebrochen: {0}")]
    AufgabeAbgebrochen(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
