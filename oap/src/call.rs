//! Pro-Anruf-Zustand: TCP-Leser, Konvertierung mit Fast-Start und
//! 20ms-Ring-Publisher (§4.6, §5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use telefonkern_audio::{mulaw_encode, resample_linear, AudioRing, RingRole};
use telefonkern_core::types::CallId;
use telefonkern_observability::PipelineMetrics;
use telefonkern_protocol::{registration, subchunk::SubchunkFrame, wire, Subchunk};

use crate::buffer::OutBuffer;
use crate::config::OapConfig;
use crate::queue::{Item, WorkQueue};

pub struct ActiveCall {
    pub call_id: u32,
    stop: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    conversion_task: JoinHandle<()>,
    publish_task: JoinHandle<()>,
}

impl ActiveCall {
    /// Sofortiger Abbruch aller Tasks, fuer DEACTIVATE/SHUTDOWN. Anders als
    /// bei IAP gibt es hier keinen Flush-dann-BYE-Pfad nachzubilden: OAP
    /// empfaengt BYE von S, es schickt selbst keines, und nach Deaktivierung
    /// darf ohnehin kein Frame mehr auf `/ap_out_<C>` erscheinen (§8
    /// Invariante 2).
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        self.conversion_task.abort();
        self.publish_task.abort();
    }
}

pub type CallTable = Arc<DashMap<u32, ActiveCall>>;

pub fn neue_call_tabelle() -> CallTable {
    Arc::new(DashMap::new())
}

/// Bewusst synchron, aus demselben Grund wie `se`/`iap`: der
/// Steuerkanal-Handler ist ein `FnMut` ohne Futures-Executor.
pub fn activate(call_id: u32, config: &OapConfig, metrics: PipelineMetrics) -> anyhow::Result<ActiveCall> {
    let ring = Arc::new(AudioRing::create_or_open(
        &AudioRing::ausgehend_name(call_id),
        call_id,
        RingRole::Producer,
        config.ring.slot_size,
        config.ring.slot_count,
    )?);

    let queue = WorkQueue::new();
    let out_buffer = Arc::new(Mutex::new(OutBuffer::new(
        config.puffer.max_frames,
        Duration::from_millis(config.puffer.ueberlauf_gnadenfrist_ms),
    )));
    let stop = Arc::new(AtomicBool::new(false));

    let audio_port = config.ports.oap_audio_port(CallId(call_id));
    let std_listener = std::net::TcpListener::bind(("0.0.0.0", audio_port))?;
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener)?;
    tracing::info!(call_id, port = audio_port, "OAP-Audioserver gebunden");

    let registrierungs_ziel: SocketAddr = format!(
        "{}:{}",
        config.registrierung.synthesizer_host, config.ports.synthesizer_udp_port
    )
    .parse()?;

    let reader_task = tokio::spawn(registrierung_und_leser(
        call_id,
        listener,
        registrierungs_ziel,
        Arc::clone(&queue),
        Arc::clone(&stop),
    ));

    let conversion_task = tokio::spawn(konvertierungs_schleife(
        call_id,
        Arc::clone(&queue),
        Arc::clone(&ring),
        Arc::clone(&out_buffer),
        Arc::clone(&stop),
        metrics.clone(),
    ));

    let publish_task = tokio::spawn(ring_publisher(
        call_id,
        ring,
        out_buffer,
        config.puffer.burst_frames,
        Arc::clone(&stop),
        metrics,
    ));

    Ok(ActiveCall {
        call_id,
        stop,
        reader_task,
        conversion_task,
        publish_task,
    })
}

/// Registriert sich bei S, nimmt die eine erwartete Verbindung an und
/// liest Subchunks in die Arbeitswarteschlange.
async fn registrierung_und_leser(
    call_id: u32,
    listener: TcpListener,
    registrierungs_ziel: SocketAddr,
    queue: Arc<WorkQueue>,
    stop: Arc<AtomicBool>,
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
        _ = lies_subchunks(call_id, listener, &queue) => {
            registrierung_stoppen.store(true, Ordering::SeqCst);
        }
        _ = registrierung_fut => {}
        _ = warte_auf_stop(&stop) => {
            registrierung_stoppen.store(true, Ordering::SeqCst);
        }
    }
}

async fn warte_auf_stop(stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn lies_subchunks(call_id: u32, listener: TcpListener, queue: &Arc<WorkQueue>) {
    let (mut stream, peer) = match listener.accept().await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(call_id, fehler = %e, "Annehmen der S-Verbindung fehlgeschlagen");
            return;
        }
    };

    match wire::read_hello(&mut stream).await {
        Ok(hello_call_id) if hello_call_id.inner() == call_id => {
            tracing::info!(call_id, peer = %peer, "S verbunden");
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

    loop {
        match telefonkern_protocol::subchunk::read_subchunk(&mut stream).await {
            Ok(SubchunkFrame::Data(sc)) => queue.push(Item::Data(sc)),
            Ok(SubchunkFrame::Bye) => {
                queue.push(Item::Bye);
                tracing::info!(call_id, "BYE von S empfangen");
                return;
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Lesen von S fehlgeschlagen");
                return;
            }
        }
    }
}

/// Resampled/enkodiert jeden Subchunk auf 160-Byte-µ-law-Fenster und
/// wendet die Fast-Start-Regel aus §4.6 auf das erste hoerbare Fenster
/// je Aeusserung an.
async fn konvertierungs_schleife(
    call_id: u32,
    queue: Arc<WorkQueue>,
    ring: Arc<AudioRing>,
    out_buffer: Arc<Mutex<OutBuffer>>,
    stop: Arc<AtomicBool>,
    metrics: PipelineMetrics,
) {
    let mut pending_first_rtp = true;
    let mut rest: Vec<u8> = Vec::new();
    let mut aeusserung_begonnen: Option<std::time::Instant> = None;

    while !stop.load(Ordering::SeqCst) {
        let eintraege = queue.drain_all();
        if eintraege.is_empty() {
            tokio::select! {
                _ = queue.warte_auf_eintrag() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            continue;
        }

        for eintrag in eintraege {
            match eintrag {
                Item::Bye => {
                    tracing::debug!(call_id, "Aeusserungsstrom beendet, OAP bleibt fuer Re-Aktivierung bereit");
                }
                Item::Data(sc) => {
                    if sc.is_end_of_utterance() {
                        pending_first_rtp = true;
                        aeusserung_begonnen = None;
                        rest.clear();
                        continue;
                    }
                    if pending_first_rtp {
                        aeusserung_begonnen.get_or_insert_with(std::time::Instant::now);
                    }

                    let muenzen = mulaw_fuer_subchunk(&sc);
                    rest.extend_from_slice(&muenzen);

                    if pending_first_rtp {
                        while rest.len() >= 160 {
                            let fenster: [u8; 160] = rest[..160].try_into().unwrap();
                            if is_silence_fenster(&fenster) {
                                rest.drain(..160);
                                continue;
                            }
                            match ring.write_frame(&fenster) {
                                Ok(true) => {
                                    let latenz = aeusserung_begonnen
                                        .take()
                                        .map(|t| t.elapsed().as_secs_f64())
                                        .unwrap_or(0.0);
                                    tracing::info!(call_id, latenz_s = latenz, "t3 (erster hoerbarer RTP-Frame gesendet)");
                                    metrics.fast_start_latency_seconds.observe(latenz);
                                }
                                Ok(false) => {
                                    metrics
                                        .frames_dropped_total
                                        .with_label_values(&["ring_voll_fast_start"])
                                        .inc();
                                }
                                Err(e) => {
                                    tracing::warn!(call_id, fehler = %e, "Fast-Start-Schreiben in ausgehenden Ring fehlgeschlagen");
                                }
                            }
                            rest.drain(..160);
                            pending_first_rtp = false;
                            break;
                        }
                    }

                    while rest.len() >= 160 {
                        let fenster: [u8; 160] = rest[..160].try_into().unwrap();
                        rest.drain(..160);
                        let mut puffer = out_buffer.lock();
                        if puffer.push(fenster) {
                            metrics
                                .frames_dropped_total
                                .with_label_values(&["out_buffer_ueberlauf"])
                                .inc();
                        }
                    }
                }
            }
        }
    }
}

fn mulaw_fuer_subchunk(sc: &Subchunk) -> Vec<u8> {
    let resampled = match resample_linear(&sc.samples, sc.sample_rate.max(8_000), 8_000) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(fehler = %e, "Resampling des Subchunks fehlgeschlagen");
            return Vec::new();
        }
    };
    let pcm16: Vec<i16> = resampled
        .iter()
        .map(|&s| (s * 32768.0).clamp(-32768.0, 32767.0) as i16)
        .collect();
    mulaw_encode(&pcm16)
}

fn is_silence_fenster(fenster: &[u8; 160]) -> bool {
    fenster.iter().all(|&b| b == 0xFF)
}

/// 20ms-Ring-Publisher: zieht bis zu `burst_frames` Frames aus `out_buffer`
/// und schreibt sie in `/ap_out_<C>`. Ist der Puffer leer, wird in diesem
/// Tick nichts publiziert — SE's Scheduler ersetzt das fehlende Frame durch
/// Stille (§4.6).
async fn ring_publisher(
    call_id: u32,
    ring: Arc<AudioRing>,
    out_buffer: Arc<Mutex<OutBuffer>>,
    burst_frames: usize,
    stop: Arc<AtomicBool>,
    metrics: PipelineMetrics,
) {
    let mut tick = interval(Duration::from_millis(20));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.load(Ordering::SeqCst) {
        tick.tick().await;

        let mut gesendet = 0usize;
        for _ in 0..burst_frames {
            let frame = {
                let mut puffer = out_buffer.lock();
                let frame = puffer.pop();
                if frame.is_some() {
                    puffer.markiere_scheduler_aktiv();
                }
                frame
            };
            let Some(frame) = frame else { break };
            match ring.write_frame(&frame) {
                Ok(true) => gesendet += 1,
                Ok(false) => {
                    metrics
                        .frames_dropped_total
                        .with_label_values(&["ring_voll"])
                        .inc();
                }
                Err(e) => {
                    tracing::warn!(call_id, fehler = %e, "Schreiben in ausgehenden Ring fehlgeschlagen");
                }
            }
        }
        if gesendet > 0 {
            metrics.frames_produced_total.inc_by(gesendet as f64);
        }

        if !ring.peer_is_alive() {
            tracing::warn!(call_id, "Peer-Herzschlag am ausgehenden Ring ueberfaellig, beende Ring-Publisher");
            break;
        }
    }
}
