//! Sitzungstabelle, angelegt bei HELLO von R auf dem festen TCP-Port,
//! abgebaut bei BYE oder Lesefehler (§4.5) — nicht bei ACTIVATE/DEACTIVATE.
//! Die Verbindung zu OAP wird erst bei der ersten Antwort eines Anrufs
//! eroeffnet, nicht bei Sitzungsanlage (anders als T→R und R→S in §4.7).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use telefonkern_core::types::CallId;
use telefonkern_engine::tts::TtsEngine;
use telefonkern_observability::PipelineMetrics;
use telefonkern_protocol::chunk;
use telefonkern_protocol::registration::RegistrationMessage;
use telefonkern_protocol::retry::connect_with_retry;
use telefonkern_protocol::subchunk::{write_subchunk, write_subchunk_bye, Subchunk};
use telefonkern_protocol::wire;

use crate::config::SynthesizerConfig;

/// Menge der Anruf-IDs, fuer die OAP sich per UDP REGISTER gemeldet hat
/// (§4.5: "S records that C is ready"). Rein informativ — der eigentliche
/// Verbindungsaufbau zu OAP laeuft ueber `connect_with_retry` und toleriert
/// auch ein noch fehlendes REGISTER.
pub type BereiteCalls = Arc<DashSet<u32>>;

pub fn neue_bereite_calls() -> BereiteCalls {
    Arc::new(DashSet::new())
}

struct SitzungsKern {
    oap_stream: AsyncMutex<Option<TcpStream>>,
    chunk_counter: AtomicU32,
    disconnect: AtomicBool,
}

impl SitzungsKern {
    fn neu() -> Self {
        Self {
            oap_stream: AsyncMutex::new(None),
            chunk_counter: AtomicU32::new(0),
            disconnect: AtomicBool::new(false),
        }
    }

    fn naechste_chunk_id(&self) -> u32 {
        self.chunk_counter.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct Session {
    kern: Arc<SitzungsKern>,
    task: JoinHandle<()>,
}

impl Session {
    pub fn stop(&self) {
        self.task.abort();
    }
}

pub type SessionTable = Arc<DashMap<u32, Session>>;

pub fn neue_sitzungstabelle() -> SessionTable {
    Arc::new(DashMap::new())
}

/// Laeuft fuer die Lebensdauer des Prozesses: nimmt OAP's REGISTER/BYE
/// entgegen und pflegt die Bereitschaftsmenge (§4.5).
pub async fn registrierungs_schleife(config: Arc<SynthesizerConfig>, bereite_calls: BereiteCalls) {
    let bind_addr = format!("0.0.0.0:{}", config.ports.synthesizer_udp_port);
    let socket = match UdpSocket::bind(&bind_addr).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(fehler = %e, addr = %bind_addr, "UDP-Registrierungssocket konnte nicht gebunden werden");
            return;
        }
    };
    tracing::info!(addr = %bind_addr, "Registrierungssocket fuer OAP gebunden");

    let mut puffer = [0u8; 256];
    loop {
        let (n, peer) = match socket.recv_from(&mut puffer).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(fehler = %e, "Empfang auf Registrierungssocket fehlgeschlagen");
                continue;
            }
        };

        let text = String::from_utf8_lossy(&puffer[..n]);
        match RegistrationMessage::decode(&text) {
            Some(RegistrationMessage::Register(call_id)) => {
                let c = call_id.inner();
                bereite_calls.insert(c);
                tracing::debug!(call_id = c, von = %peer, "REGISTER von OAP erhalten");
            }
            Some(RegistrationMessage::Bye(call_id)) => {
                bereite_calls.remove(&call_id.inner());
            }
            None => {
                tracing::warn!(von = %peer, "Unlesbares Registrierungspaket");
            }
        }
    }
}

/// Laeuft fuer die Lebensdauer des Prozesses: akzeptiert R's Verbindungen auf
/// dem festen Synthesizer-Port und legt pro HELLO eine Sitzung an (§4.5).
pub async fn annahme_schleife(
    config: Arc<SynthesizerConfig>,
    sitzungen: SessionTable,
    bereite_calls: BereiteCalls,
    tts: TtsEngine,
    metrics: PipelineMetrics,
) {
    let bind_addr = format!("0.0.0.0:{}", config.ports.synthesizer_tcp_port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(fehler = %e, addr = %bind_addr, "Synthesizer-TCP-Server konnte nicht gebunden werden");
            return;
        }
    };
    tracing::info!(addr = %bind_addr, "Synthesizer-TCP-Server fuer R gebunden");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(fehler = %e, "Annehmen einer R-Verbindung fehlgeschlagen");
                continue;
            }
        };

        tokio::spawn(behandle_verbindung(
            stream,
            peer,
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            Arc::clone(&bereite_calls),
            tts.clone(),
            metrics.clone(),
        ));
    }
}

async fn behandle_verbindung(
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
    config: Arc<SynthesizerConfig>,
    sitzungen: SessionTable,
    bereite_calls: BereiteCalls,
    tts: TtsEngine,
    metrics: PipelineMetrics,
) {
    let call_id = match wire::read_hello(&mut stream).await {
        Ok(c) => c.inner(),
        Err(e) => {
            tracing::warn!(fehler = %e, peer = %peer, "HELLO-Lesen von R fehlgeschlagen");
            return;
        }
    };

    if sitzungen.contains_key(&call_id) {
        tracing::warn!(call_id, "Sitzung existiert bereits, verwerfe doppelte R-Verbindung");
        return;
    }

    tracing::info!(call_id, peer = %peer, "R verbunden");

    let kern = Arc::new(SitzungsKern::neu());
    let task = tokio::spawn(lese_schleife(
        call_id,
        stream,
        config,
        tts,
        bereite_calls,
        metrics,
        Arc::clone(&kern),
        Arc::clone(&sitzungen),
    ));

    sitzungen.insert(call_id, Session { kern, task });
}

/// Liest Antworttexte von R bis BYE oder Lesefehler und synthetisiert jeden
/// als eigene Aeusserung (§4.5).
async fn lese_schleife(
    call_id: u32,
    mut stream: TcpStream,
    config: Arc<SynthesizerConfig>,
    tts: TtsEngine,
    bereite_calls: BereiteCalls,
    metrics: PipelineMetrics,
    kern: Arc<SitzungsKern>,
    sitzungen: SessionTable,
) {
    loop {
        match wire::read_frame(&mut stream, wire::DEFAULT_MAX_FRAME_SIZE).await {
            Ok(wire::Frame::Payload(payload)) => {
                let text = chunk::decode_text(&payload);
                synthetisiere_und_sende(
                    call_id,
                    &config,
                    &tts,
                    &bereite_calls,
                    &metrics,
                    &kern,
                    &text,
                )
                .await;
            }
            Ok(wire::Frame::Bye) => {
                tracing::info!(call_id, "BYE von R erhalten");
                break;
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Lesen von R fehlgeschlagen");
                break;
            }
        }
    }

    kern.disconnect.store(true, Ordering::SeqCst);
    beende_sitzung(call_id, &sitzungen, &kern).await;
}

/// Eroeffnet bei Bedarf die OAP-Verbindung (lazy, erste Antwort eines Anrufs,
/// §4.5/§4.7), streamt die TTS-Ausgabe in festen 40ms-Subchunks und schliesst
/// jede Aeusserung mit einem 0-laengen Ende-Marker ab.
async fn synthetisiere_und_sende(
    call_id: u32,
    config: &SynthesizerConfig,
    tts: &TtsEngine,
    bereite_calls: &BereiteCalls,
    metrics: &PipelineMetrics,
    kern: &Arc<SitzungsKern>,
    text: &str,
) {
    if kern.disconnect.load(Ordering::SeqCst) {
        return;
    }

    {
        let guard = kern.oap_stream.lock().await;
        if guard.is_none() {
            drop(guard);
            if !verbinde_mit_oap(call_id, config, bereite_calls, kern).await {
                tracing::warn!(call_id, "OAP nicht erreichbar, Aeusserung wird verworfen");
                return;
            }
        }
    }

    let rate = telefonkern_engine::tts::SYNTH_SAMPLE_RATE_HZ;
    let subchunk_len = config.synthese.subchunk_samples.max(1);
    let mut rx = tts.stream(call_id, text.to_string(), config.synthese.voice.clone());

    let mut restpuffer: Vec<f32> = Vec::with_capacity(subchunk_len);
    let mut irgendetwas_gesendet = false;

    while let Some(block) = rx.recv().await {
        restpuffer.extend_from_slice(&block);
        while restpuffer.len() >= subchunk_len {
            let samples: Vec<f32> = restpuffer.drain(..subchunk_len).collect();
            if !sende_subchunk(call_id, kern, metrics, rate, samples).await {
                return;
            }
            irgendetwas_gesendet = true;
        }
    }

    if !restpuffer.is_empty() {
        if !sende_subchunk(call_id, kern, metrics, rate, restpuffer).await {
            return;
        }
        irgendetwas_gesendet = true;
    }

    if !irgendetwas_gesendet {
        tracing::warn!(call_id, "TTS lieferte keine Samples, sende stillen Ende-Marker");
    }

    let ende_id = kern.naechste_chunk_id();
    let mut guard = kern.oap_stream.lock().await;
    if let Some(oap_stream) = guard.as_mut() {
        let marker = Subchunk {
            sample_rate: rate,
            chunk_id: ende_id,
            samples: Vec::new(),
        };
        if write_subchunk(oap_stream, &marker).await.is_err() {
            tracing::warn!(call_id, "Ende-Marker an OAP konnte nicht gesendet werden");
            *guard = None;
        }
    }
}

async fn sende_subchunk(
    call_id: u32,
    kern: &SitzungsKern,
    metrics: &PipelineMetrics,
    rate: u32,
    samples: Vec<f32>,
) -> bool {
    let subchunk = Subchunk {
        sample_rate: rate,
        chunk_id: kern.naechste_chunk_id(),
        samples,
    };

    let mut guard = kern.oap_stream.lock().await;
    match guard.as_mut() {
        Some(stream) => match write_subchunk(stream, &subchunk).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Schreiben an OAP fehlgeschlagen, Aeusserung wird abgebrochen");
                *guard = None;
                metrics.retry_exhausted_total.inc();
                false
            }
        },
        None => false,
    }
}

/// Oeffnet die OAP-Verbindung fuer einen Anruf (§4.5 Satz 2: erst bei der
/// ersten Antwort, nicht eifrig bei Sitzungsanlage). Nutzt den vollen
/// §4.7-Retry; schlaegt der fehl, wird diese eine Aeusserung verworfen, ohne
/// R's Schleife zu blockieren.
async fn verbinde_mit_oap(
    call_id: u32,
    config: &SynthesizerConfig,
    bereite_calls: &BereiteCalls,
    kern: &SitzungsKern,
) -> bool {
    if !bereite_calls.contains(&call_id) {
        tracing::debug!(call_id, "OAP hat sich noch nicht als bereit gemeldet, verbinde trotzdem");
    }

    let oap_addr = format!(
        "{}:{}",
        config.registrierung.oap_host,
        config.ports.oap_audio_port(CallId(call_id))
    );

    match connect_with_retry("S-OAP-Verbindung", |_| TcpStream::connect(oap_addr.clone())).await {
        Ok(mut stream) => match wire::write_hello(&mut stream, CallId(call_id)).await {
            Ok(()) => {
                *kern.oap_stream.lock().await = Some(stream);
                tracing::info!(call_id, "Verbindung zu OAP hergestellt");
                true
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "HELLO an OAP fehlgeschlagen");
                false
            }
        },
        Err(e) => {
            tracing::warn!(call_id, fehler = %e, "Verbindung zu OAP endgueltig fehlgeschlagen");
            false
        }
    }
}

async fn beende_sitzung(call_id: u32, sitzungen: &SessionTable, kern: &SitzungsKern) {
    let mut guard = kern.oap_stream.lock().await;
    if let Some(stream) = guard.as_mut() {
        let _ = wire::write_bye(stream).await;
    }
    drop(guard);
    sitzungen.remove(&call_id);
    tracing::info!(call_id, "Sitzung beendet");
}

/// Synthetisiert beim Start ein paar kurze Phrasen und verwirft das Audio,
/// um Modell-Kernel vorzukompilieren (§4.5 Warm-up).
pub async fn warmlaufen(tts: &TtsEngine, phrasen: &[String], voice: &str) {
    for phrase in phrasen {
        let mut rx = tts.stream(0, phrase.clone(), voice.to_string());
        let mut bloecke = 0usize;
        while rx.recv().await.is_some() {
            bloecke += 1;
        }
        tracing::debug!(phrase = %phrase, bloecke, "Aufwaerm-Synthese abgeschlossen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telefonkern_engine::testing::{FailingTts, FakeTts};

    #[tokio::test]
    async fn sitzungstabelle_ist_anfangs_leer() {
        let t = neue_sitzungstabelle();
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn warmlaufen_erschoepft_jeden_stream() {
        let tts = TtsEngine::new(Box::new(FakeTts::default()));
        warmlaufen(&tts, &["Hello.".to_string(), "Thanks.".to_string()], "default").await;
    }

    #[tokio::test]
    async fn fehlende_oap_verbindung_verwirft_aeusserung_ohne_panik() {
        let tts = TtsEngine::new(Box::new(FakeTts::default()));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = SynthesizerConfig::default();
        let bereite_calls = neue_bereite_calls();
        let kern = Arc::new(SitzungsKern::neu());

        synthetisiere_und_sende(1, &config, &tts, &bereite_calls, &metrics, &kern, "hi there").await;
        assert!(kern.oap_stream.lock().await.is_none());
    }

    #[tokio::test]
    async fn tts_fehler_bricht_ohne_panik_ab() {
        let tts = TtsEngine::new(Box::new(FailingTts));
        let mut rx = tts.stream(1, "hi".to_string(), "default".to_string());
        assert_eq!(rx.recv().await, None);
    }
}
