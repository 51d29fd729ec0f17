//! ASR-Primitive (§4.3, §9)
//!
//! `asr(pcm16k_mono, language) -> text` ist pro Anruf einfach-threaded; ein
//! eventuell gewaermter Modellkontext wird ueber ein einzelnes Mutex
//! serialisiert. Das Mutex liegt auf dem Prozess (dem "Engine"-Objekt), nicht
//! auf der Pro-Anruf-Sitzung — Sitzungen halten nur ein Handle.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{EngineError, Result};

/// Blockierende ASR-Implementierung. Laeuft unter dem Kontext-Mutex der
/// Engine, daher synchron statt async.
pub trait AsrPrimitive: Send {
    fn asr(&mut self, pcm16k_mono: &[f32], language: &str) -> anyhow::Result<String>;
}

/// Gewaermter, gemeinsam genutzter ASR-Kontext. `transcribe` serialisiert
/// alle Aufrufe durch ein Mutex und verschiebt die blockierende Inferenz auf
/// einen Blocking-Thread, damit der Tokio-Scheduler nicht blockiert.
pub struct AsrEngine {
    context: Arc<Mutex<Box<dyn AsrPrimitive>>>,
}

impl AsrEngine {
    pub fn new(primitive: Box<dyn AsrPrimitive>) -> Self {
        Self {
            context: Arc::new(Mutex::new(primitive)),
        }
    }

    pub async fn transcribe(&self, call_id: u32, pcm16k_mono: Vec<f32>, language: &str) -> Result<String> {
        let context = Arc::clone(&self.context);
        let language = language.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = context.lock();
            guard.asr(&pcm16k_mono, &language)
        })
        .await?
        .map_err(|e| EngineError::Asr {
            call_id,
            grund: e.to_string(),
        })
    }
}

impl Clone for AsrEngine {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl AsrPrimitive for Echo {
        fn asr(&mut self, pcm16k_mono: &[f32], _language: &str) -> anyhow::Result<String> {
            Ok(format!("{} samples", pcm16k_mono.len()))
        }
    }

    struct AlwaysFails;
    impl AsrPrimitive for AlwaysFails {
        fn asr(&mut self, _pcm16k_mono: &[f32], _language: &str) -> anyhow::Result<String> {
            anyhow::bail!("Modell nicht geladen")
        }
    }

    #[tokio::test]
    async fn transkribiert_ueber_blocking_thread() {
        let engine = AsrEngine::new(Box::new(Echo));
        let text = engine.transcribe(1, vec![0.0; 160], "en").await.unwrap();
        assert_eq!(text, "160 samples");
    }

    #[tokio::test]
    async fn fehler_wird_zu_engine_error_mit_call_id() {
        let engine = AsrEngine::new(Box::new(AlwaysFails));
        let err = engine.transcribe(7, vec![], "en").await.unwrap_err();
        match err {
            EngineError::Asr { call_id, .. } => assert_eq!(call_id, 7),
            other => panic!("unerwarteter Fehlertyp: {other:?}"),
        }
    }

    #[tokio::test]
    async fn serialisiert_parallele_aufrufe() {
        let engine = AsrEngine::new(Box::new(Echo));
        let a = engine.clone();
        let b = engine.clone();
        let (r1, r2) = tokio::join!(
            a.transcribe(1, vec![0.0; 10], "en"),
            b.transcribe(2, vec![0.0; 20], "en"),
        );
        assert_eq!(r1.unwrap(), "10 samples");
        assert_eq!(r2.unwrap(), "20 samples");
    }
}
