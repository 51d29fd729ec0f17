//! TTS-Primitive und Streaming-Producer (§4.5, §9 REDESIGN)
//!
//! `synth(text, voice)` liefert einen traegen Iterator ueber 24-kHz-PCM-
//! Bloecke. Statt Koroutinen-artigem "send as you synthesize" laeuft ein
//! dedizierter Producer-Thread, der den Iterator treibt und Bloecke in einen
//! begrenzten Kanal schiebt; der Konsument (S' TCP-Sender) zieht daraus mit
//! natuerlicher Backpressure durch die Kanalkapazitaet.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};

pub const SYNTH_SAMPLE_RATE_HZ: u32 = 24_000;

/// Blockierender TTS-Iterator-Erzeuger, unter dem Kontext-Mutex der Engine.
pub trait TtsPrimitive: Send {
    /// Gibt einen Iterator ueber PCM-Bloecke zurueck. Der Aufrufer treibt ihn
    /// bis `None` auf einem Blocking-Thread.
    fn synth(&mut self, text: &str, voice: &str) -> anyhow::Result<Box<dyn Iterator<Item = Vec<f32>> + Send>>;
}

pub struct TtsEngine {
    context: Arc<Mutex<Box<dyn TtsPrimitive>>>,
}

impl TtsEngine {
    pub fn new(primitive: Box<dyn TtsPrimitive>) -> Self {
        Self {
            context: Arc::new(Mutex::new(primitive)),
        }
    }

    /// Startet den Producer-Thread und gibt einen begrenzten Empfaenger
    /// zurueck, ueber den die Bloecke in Synthese-Reihenfolge ankommen.
    /// Ein Synth-Fehler schliesst den Kanal ohne weitere Bloecke (Aufrufer
    /// soll still-end-marker senden, siehe Ausfallmodus in §4.5).
    pub fn stream(&self, call_id: u32, text: String, voice: String) -> mpsc::Receiver<Vec<f32>> {
        let (tx, rx) = mpsc::channel(8);
        let context = Arc::clone(&self.context);

        std::thread::Builder::new()
            .name(format!("tts-synth-{call_id}"))
            .spawn(move || {
                let iter_result = {
                    let mut guard = context.lock();
                    guard.synth(&text, &voice)
                };
                match iter_result {
                    Ok(iter) => {
                        for block in iter {
                            if tx.blocking_send(block).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(call_id, fehler = %e, "TTS-Synthese fehlgeschlagen");
                    }
                }
            })
            .expect("TTS-Producer-Thread konnte nicht gestartet werden");

        rx
    }
}

impl Clone for TtsEngine {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

pub fn tts_error(call_id: u32, grund: impl std::fmt::Display) -> EngineError {
    EngineError::Tts {
        call_id,
        grund: grund.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ChunkedTone {
        blocks: usize,
    }
    impl TtsPrimitive for ChunkedTone {
        fn synth(
            &mut self,
            _text: &str,
            _voice: &str,
        ) -> anyhow::Result<Box<dyn Iterator<Item = Vec<f32>> + Send>> {
            let blocks = self.blocks;
            Ok(Box::new((0..blocks).map(|i| vec![i as f32; 240])))
        }
    }

    struct AlwaysFails;
    impl TtsPrimitive for AlwaysFails {
        fn synth(
            &mut self,
            _text: &str,
            _voice: &str,
        ) -> anyhow::Result<Box<dyn Iterator<Item = Vec<f32>> + Send>> {
            anyhow::bail!("Stimmmodell nicht verfuegbar")
        }
    }

    #[tokio::test]
    async fn streamt_alle_bloecke_in_reihenfolge() {
        let engine = TtsEngine::new(Box::new(ChunkedTone { blocks: 3 }));
        let mut rx = engine.stream(1, "hello".to_string(), "default".to_string());
        let mut got = Vec::new();
        while let Some(block) = rx.recv().await {
            got.push(block[0]);
        }
        assert_eq!(got, vec![0.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn fehler_liefert_leeren_stream() {
        let engine = TtsEngine::new(Box::new(AlwaysFails));
        let mut rx = engine.stream(1, "hello".to_string(), "default".to_string());
        assert_eq!(rx.recv().await, None);
    }
}
