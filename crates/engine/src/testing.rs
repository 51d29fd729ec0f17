//! In-Prozess-Fakes der ASR/LLM/TTS-Primitive fuer Integrationstests (§10)
//!
//! Die echten Engines sind ausdruecklich nicht Teil dieses Crates; diese
//! Fakes lassen andere Crates (Transcriber, Reasoner, Synthesizer) ihre
//! Pipeline-Logik ohne ein reales Modell testen.

use crate::asr::AsrPrimitive;
use crate::llm::{ConversationState, ReplyPrimitive};
use crate::tts::TtsPrimitive;

/// Gibt die Anzahl der Samples als Text zurueck — deterministisch, kein
/// echtes Sprachmodell noetig.
pub struct FakeAsr;
impl AsrPrimitive for FakeAsr {
    fn asr(&mut self, pcm16k_mono: &[f32], _language: &str) -> anyhow::Result<String> {
        Ok(format!("transcribed {} samples", pcm16k_mono.len()))
    }
}

/// Schlaegt bei jedem Aufruf fehl — fuer Szenario-Tests des Inferenz-
/// Ausfallpfads (§8 Szenario 3).
pub struct FailingAsr;
impl AsrPrimitive for FailingAsr {
    fn asr(&mut self, _pcm16k_mono: &[f32], _language: &str) -> anyhow::Result<String> {
        anyhow::bail!("ASR-Fake-Fehler")
    }
}

/// Wiederholt den Benutzertext mit einem festen Praefix.
pub struct FakeLlm {
    pub prefix: String,
}
impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            prefix: "echo: ".to_string(),
        }
    }
}
impl ReplyPrimitive for FakeLlm {
    fn reply(
        &mut self,
        _conversation_state: &ConversationState,
        user_text: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> anyhow::Result<String> {
        Ok(format!("{}{user_text}", self.prefix))
    }
}

/// Schlaegt bei jedem Aufruf fehl — fuer Szenario-Tests des LLM-Timeout-Pfads
/// (§8 Szenario 3).
pub struct FailingLlm;
impl ReplyPrimitive for FailingLlm {
    fn reply(
        &mut self,
        _conversation_state: &ConversationState,
        _user_text: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> anyhow::Result<String> {
        anyhow::bail!("LLM-Fake-Timeout")
    }
}

/// Erzeugt `block_count` Bloecke konstanter Amplitude statt echter Sprache.
pub struct FakeTts {
    pub block_count: usize,
    pub block_len: usize,
}
impl Default for FakeTts {
    fn default() -> Self {
        Self {
            block_count: 4,
            block_len: 240,
        }
    }
}
impl TtsPrimitive for FakeTts {
    fn synth(
        &mut self,
        _text: &str,
        _voice: &str,
    ) -> anyhow::Result<Box<dyn Iterator<Item = Vec<f32>> + Send>> {
        let block_count = self.block_count;
        let block_len = self.block_len;
        Ok(Box::new((0..block_count).map(move |_| vec![0.1f32; block_len])))
    }
}

/// Schlaegt bei jedem Aufruf fehl — fuer Szenario-Tests des TTS-Ausfallpfads
/// (§8 Szenario 3).
pub struct FailingTts;
impl TtsPrimitive for FailingTts {
    fn synth(
        &mut self,
        _text: &str,
        _voice: &str,
    ) -> anyhow::Result<Box<dyn Iterator<Item = Vec<f32>> + Send>> {
        anyhow::bail!("TTS-Fake-Fehler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_asr_meldet_sample_anzahl() {
        let mut asr = FakeAsr;
        let out = asr.asr(&[0.0; 42], "en").unwrap();
        assert_eq!(out, "transcribed 42 samples");
    }

    #[test]
    fn fake_llm_echot_mit_praefix() {
        let mut llm = FakeLlm::default();
        let out = llm
            .reply(&ConversationState::default(), "hi", 48, 0.2)
            .unwrap();
        assert_eq!(out, "echo: hi");
    }

    #[test]
    fn fake_tts_erzeugt_erwartete_blockanzahl() {
        let mut tts = FakeTts::default();
        let blocks: Vec<_> = tts.synth("hello", "default").unwrap().collect();
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn failing_fakes_liefern_fehler() {
        let mut asr = FailingAsr;
        assert!(asr.asr(&[], "en").is_err());
        let mut llm = FailingLlm;
        assert!(llm
            .reply(&ConversationState::default(), "hi", 48, 0.2)
            .is_err());
        let mut tts = FailingTts;
        assert!(tts.synth("hi", "default").is_err());
    }
}
