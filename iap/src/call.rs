//! Pro-Anruf-Zustand: Ring-Konsument/VAD-Thread, Registrierung und
//! TCP-Schreiber an T (§4.2, §4.7).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use telefonkern_audio::{mulaw_decode, resample_linear, AudioRing, RingRole, Vad, VadConfig};
use telefonkern_core::types::CallId;
use telefonkern_observability::PipelineMetrics;
use telefonkern_protocol::{chunk::encode_chunk, registration, wire};

use crate::config::IapConfig;
use crate::queue::{ChunkQueue, Item};

pub struct ActiveCall {
    pub call_id: u32,
    stop: Arc<AtomicBool>,
    vad_task: JoinHandle<()>,
    net_task: JoinHandle<()>,
}

impl ActiveCall {
    /// Signalisiert Deaktivierung; der VAD-Task flusht den laufenden Chunk
    /// (falls vorhanden) und haengt BYE an die Warteschlange, der Netz-Task
    /// sendet es und schliesst die Verbindung (§4.2 BYE-Ausloeser). Die
    /// beiden Tasks laufen danach ohne gehaltenes Handle zu Ende.
    pub fn deaktivieren(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Sofortiger Abbruch ohne Flush, fuer SHUTDOWN.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.vad_task.abort();
        self.net_task.abort();
    }
}

pub type CallTable = Arc<DashMap<u32, ActiveCall>>;

pub fn neue_call_tabelle() -> CallTable {
    Arc::new(DashMap::new())
}

/// Aktiviert einen Anruf: legt den eingehenden Ring an, bindet den
/// TCP-Audioserver und startet VAD- und Netz-Task.
///
/// Bewusst synchron, aus demselben Grund wie in `se::call::activate`: der
/// Steuerkanal-Handler ist eine simple `FnMut(ControlCommand) -> String`-
/// Closure ohne eigenen Executor. `TcpListener::bind` laeuft daher ueber
/// `std::net::TcpListener`, danach per `from_std` in den laufenden
/// Tokio-Reaktor uebernommen.
pub fn activate(
    call_id: u32,
    config: &IapConfig,
    metrics: PipelineMetrics,
) -> anyhow::Result<ActiveCall> {
    let ring = Arc::new(AudioRing::create_or_open(
        &AudioRing::eingehend_name(call_id),
        call_id,
        RingRole::Consumer,
        config.ring.slot_size,
        config.ring.slot_count,
    )?);

    let queue = ChunkQueue::new(config.warteschlange.kapazitaet);
    let stop = Arc::new(AtomicBool::new(false));

    let vad_task = tokio::spawn(ring_vad_schleife(
        call_id,
        Arc::clone(&ring),
        Arc::clone(&queue),
        config.vad.into(),
        Arc::clone(&stop),
        metrics.clone(),
    ));

    let audio_port = config.ports.iap_audio_port(CallId(call_id));
    let std_listener = std::net::TcpListener::bind(("0.0.0.0", audio_port))?;
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener)?;
    tracing::info!(call_id, port = audio_port, "IAP-Audioserver gebunden");

    let registrierungs_ziel: SocketAddr = format!(
        "{}:{}",
        config.registrierung.transcriber_host, config.ports.transcriber_udp_port
    )
    .parse()?;

    let net_task = tokio::spawn(netz_schleife(
        call_id,
        listener,
        registrierungs_ziel,
        queue,
        Arc::clone(&stop),
        metrics,
    ));

    Ok(ActiveCall {
        call_id,
        stop,
        vad_task,
        net_task,
    })
}

/// Liest µ-law-Frames aus dem eingehenden Ring, dekodiert und resampled sie
/// auf 16 kHz, und speist sie fensterweise in die VAD. Laeuft unabhaengig
/// davon, ob T schon verbunden ist (§4.2 Concurrency).
async fn ring_vad_schleife(
    call_id: u32,
    ring: Arc<AudioRing>,
    queue: Arc<ChunkQueue>,
    vad_config: VadConfig,
    stop: Arc<AtomicBool>,
    metrics: PipelineMetrics,
) {
    let mut vad = Vad::new(vad_config);

    while !stop.load(Ordering::SeqCst) {
        match ring.read_frame() {
            Ok(Some(mulaw_bytes)) => {
                let pcm16: Vec<i16> = mulaw_decode(&mulaw_bytes);
                let pcm_f32: Vec<f32> = pcm16.iter().map(|&s| s as f32 / 32768.0).collect();
                let resampled = match resample_linear(&pcm_f32, 8_000, 16_000) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(call_id, fehler = %e, "Resampling fehlgeschlagen");
                        continue;
                    }
                };

                if let Some(chunk) = vad.push_window(&resampled) {
                    if queue.push_chunk(chunk) {
                        metrics
                            .frames_dropped_total
                            .with_label_values(&["tcp_warteschlange_voll"])
                            .inc();
                    }
                }
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Lesen aus eingehendem Ring fehlgeschlagen");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        if !ring.peer_is_alive() {
            tracing::warn!(call_id, "Peer-Herzschlag am eingehenden Ring ueberfaellig, beende VAD-Schleife");
            break;
        }
    }

    if let Some(letzter_chunk) = vad.flush() {
        queue.push_chunk(letzter_chunk);
    }
    queue.push_bye();
}

/// Registriert sich bei T, nimmt die eine erwartete Verbindung an und
/// schreibt Chunks/BYE aus der Warteschlange, sobald sie ankommen.
async fn netz_schleife(
    call_id: u32,
    listener: TcpListener,
    registrierungs_ziel: SocketAddr,
    queue: Arc<ChunkQueue>,
    stop: Arc<AtomicBool>,
    metrics: PipelineMetrics,
) {
    let registrierungs_socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(call_id, fehler = %e, "Registrierungs-Socket konnte nicht gebunden werden");
            return;
        }
    };

    let registrierung_stoppen = Arc::new(AtomicBool::new(false));

    let registrierung_fut = registration::register_bis_verbunden(
        &registrierungs_socket,
        registrierungs_ziel,
        CallId(call_id),
        &registrierung_stoppen,
    );

    tokio::select! {
        akzeptiert = akzeptiere_und_schreibe(call_id, listener, &queue, &stop, &metrics) => {
            registrierung_stoppen.store(true, Ordering::SeqCst);
            let _ = akzeptiert;
        }
        _ = registrierung_fut => {}
    }

    registration::bye_best_effort(&registrierungs_socket, registrierungs_ziel, CallId(call_id)).await;
}

async fn akzeptiere_und_schreibe(
    call_id: u32,
    listener: TcpListener,
    queue: &Arc<ChunkQueue>,
    stop: &Arc<AtomicBool>,
    metrics: &PipelineMetrics,
) {
    let (mut stream, peer) = match listener.accept().await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(call_id, fehler = %e, "Annehmen der T-Verbindung fehlgeschlagen");
            return;
        }
    };

    match wire::read_hello(&mut stream).await {
        Ok(hello_call_id) if hello_call_id.inner() == call_id => {
            tracing::info!(call_id, peer = %peer, "T verbunden");
        }
        Ok(other) => {
            tracing::warn!(call_id, erhalten = other.inner(), "HELLO mit falscher Call-ID, schliesse Verbindung");
            return;
        }
        Err(e) => {
            tracing::warn!(call_id, fehler = %e, "HELLO-Lesen fehlgeschlagen");
            return;
        }
    }

    schreiber_schleife(call_id, &mut stream, queue, stop, metrics).await;
}

async fn schreiber_schleife(
    call_id: u32,
    stream: &mut TcpStream,
    queue: &Arc<ChunkQueue>,
    stop: &Arc<AtomicBool>,
    metrics: &PipelineMetrics,
) {
    loop {
        let item = match queue.pop() {
            Some(item) => item,
            None => {
                if stop.load(Ordering::SeqCst) && queue.is_empty() {
                    break;
                }
                queue.warte_auf_eintrag().await;
                continue;
            }
        };

        match item {
            Item::Chunk(chunk) => {
                let payload = encode_chunk(&chunk);
                if let Err(e) = wire::write_payload(stream, &payload).await {
                    tracing::warn!(call_id, fehler = %e, "Schreiben an T fehlgeschlagen");
                    metrics.retry_exhausted_total.inc();
                    return;
                }
            }
            Item::Bye => {
                let _ = wire::write_bye(stream).await;
                tracing::info!(call_id, "BYE an T gesendet");
                return;
            }
        }
    }
}
