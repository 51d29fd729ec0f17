//! LLM-Reply-Primitive und Half-Duplex-Sperrfrist (§4.4, §9)

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub persona: String,
    pub transcript: String,
}

impl ConversationState {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            transcript: String::new(),
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new("You are a warm, concise phone assistant.")
    }
}

/// Blockierende LLM-Implementierung, unter dem Kontext-Mutex der Engine.
pub trait ReplyPrimitive: Send {
    fn reply(
        &mut self,
        conversation_state: &ConversationState,
        user_text: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<String>;
}

pub struct LlmEngine {
    context: Arc<Mutex<Box<dyn ReplyPrimitive>>>,
}

impl LlmEngine {
    pub fn new(primitive: Box<dyn ReplyPrimitive>) -> Self {
        Self {
            context: Arc::new(Mutex::new(primitive)),
        }
    }

    pub async fn reply(
        &self,
        call_id: u32,
        conversation_state: ConversationState,
        user_text: &str,
    ) -> Result<String> {
        let context = Arc::clone(&self.context);
        let user_text = user_text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = context.lock();
            guard.reply(&conversation_state, &user_text, 48, 0.2)
        })
        .await?
        .map(|text| text.trim().to_string())
        .map_err(|e| EngineError::Llm {
            call_id,
            grund: e.to_string(),
        })
    }
}

impl Clone for LlmEngine {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

/// `half_duplex_until` Dauer ab Antwortversand: `max(800ms, len/12 + 500ms)`.
pub fn half_duplex_duration(reply_chars: usize) -> Duration {
    let derived_ms = (reply_chars as u64 / 12) + 500;
    Duration::from_millis(derived_ms.max(800))
}
