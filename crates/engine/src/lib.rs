//! telefonkern-engine – Warme ASR/LLM/TTS-Kontexte
//!
//! Jede Engine ist ein Prozess-weites Resourcen-Objekt, das Inferenzaufrufe
//! ueber ein einzelnes Mutex serialisiert; Pro-Anruf-Code haelt nur ein
//! `Clone` des Engine-Handles und eigenen Konversationszustand, nie den
//! Kontext selbst (§9 REDESIGN).

pub mod asr;
pub mod error;
pub mod llm;
pub mod postprocess;
pub mod testing;
pub mod tts;

pub use asr::{AsrEngine, AsrPrimitive};
pub use error::{EngineError, Result};
pub use llm::{half_duplex_duration, ConversationState, LlmEngine, ReplyPrimitive};
pub use tts::{TtsEngine, TtsPrimitive};
