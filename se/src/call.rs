//! Pro-Anruf-Zustand: Ringe, RTP-Sockets und die beiden Tasks
//! (Eingangs-Demuxer, Ausgangs-Scheduler), §4.1/§5.
//!
//! Ein `ActiveCall` wird von `ACTIVATE <C>` angelegt und von
//! `DEACTIVATE <C>`/`SHUTDOWN` wieder abgebaut. Nach erfolgreicher
//! Deaktivierung darf kein weiterer Frame mehr auf `/ap_out_<C>`
//! erscheinen (§8 Invariante 2) — deshalb wird der Scheduler-Task vor der
//! Bestaetigung beendet.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use telefonkern_audio::{AudioRing, RingRole};
use telefonkern_observability::PipelineMetrics;

use crate::config::{RingEinstellungen, RtpEinstellungen};
use crate::rtp;

pub struct ActiveCall {
    pub call_id: u32,
    stop: Arc<AtomicBool>,
    inbound_task: JoinHandle<()>,
    outbound_task: JoinHandle<()>,
}

impl ActiveCall {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.inbound_task.abort();
        self.outbound_task.abort();
    }
}

pub type CallTable = Arc<DashMap<u32, ActiveCall>>;

pub fn neue_call_tabelle() -> CallTable {
    Arc::new(DashMap::new())
}

/// Aktiviert einen Anruf: legt beide Ringe an, bindet den RTP-Socket und
/// startet Demuxer + Scheduler.
///
/// Bewusst synchron (kein `async fn`): der Steuerkanal-Handler laeuft als
/// simple `FnMut(ControlCommand) -> String`-Closure (kein Executor fuer
/// Futures darin), also duerfen Ring-Anlage und Socket-Bind keine `.await`
/// brauchen. Das Binden geschieht ueber `std::net::UdpSocket`, danach
/// `from_std` in den laufenden Tokio-Reaktor uebernommen; beides ist
/// innerhalb eines entered Runtime-Kontexts ohne `.await` moeglich.
pub fn activate(
    call_id: u32,
    rtp_cfg: &RtpEinstellungen,
    ring_cfg: &RingEinstellungen,
    metrics: PipelineMetrics,
) -> anyhow::Result<ActiveCall> {
    let eingehend_name = AudioRing::eingehend_name(call_id);
    let ausgehend_name = AudioRing::ausgehend_name(call_id);

    let eingehend = Arc::new(AudioRing::create_or_open(
        &eingehend_name,
        call_id,
        RingRole::Producer,
        ring_cfg.slot_size,
        ring_cfg.slot_count,
    )?);
    let ausgehend = Arc::new(AudioRing::create_or_open(
        &ausgehend_name,
        call_id,
        RingRole::Consumer,
        ring_cfg.slot_size,
        ring_cfg.slot_count,
    )?);

    let bind_addr: SocketAddr =
        format!("{}:{}", rtp_cfg.bind_adresse, rtp_cfg.port_base + call_id as u16).parse()?;
    let std_socket = std::net::UdpSocket::bind(bind_addr)?;
    std_socket.set_nonblocking(true)?;
    let socket = Arc::new(UdpSocket::from_std(std_socket)?);
    tracing::info!(call_id, addr = %bind_addr, "RTP-Socket gebunden");

    let peer_addr: Arc<Mutex<Option<SocketAddr>>> = Arc::new(Mutex::new(None));
    let stop = Arc::new(AtomicBool::new(false));

    let inbound_task = tokio::spawn(eingangs_demuxer(
        call_id,
        Arc::clone(&socket),
        Arc::clone(&eingehend),
        Arc::clone(&peer_addr),
        Arc::clone(&stop),
        metrics.clone(),
    ));

    let outbound_task = tokio::spawn(ausgangs_scheduler(
        call_id,
        Arc::clone(&socket),
        Arc::clone(&ausgehend),
        Arc::clone(&peer_addr),
        Arc::clone(&stop),
        rtp_cfg.burst_frames,
        metrics,
    ));

    Ok(ActiveCall {
        call_id,
        stop,
        inbound_task,
        outbound_task,
    })
}

/// Liest RTP-Pakete vom Socket, extrahiert den G.711-Payload und schreibt
/// ihn in den eingehenden Ring. Peer-Adresse wird aus dem ersten Paket
/// gelernt (symmetrisches RTP, da SDP-Aushandlung ausserhalb des Scopes
/// liegt, §1).
async fn eingangs_demuxer(
    call_id: u32,
    socket: Arc<UdpSocket>,
    ring: Arc<AudioRing>,
    peer_addr: Arc<Mutex<Option<SocketAddr>>>,
    stop: Arc<AtomicBool>,
    metrics: PipelineMetrics,
) {
    let mut buf = [0u8; 1500];
    while !stop.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "RTP-Empfang fehlgeschlagen");
                continue;
            }
        };
        *peer_addr.lock() = Some(from);

        let Some(payload) = rtp::unpack(&buf[..len]) else {
            continue;
        };

        match ring.write_frame(&payload) {
            Ok(true) => {}
            Ok(false) => {
                metrics
                    .frames_dropped_total
                    .with_label_values(&["ring_voll"])
                    .inc();
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Schreiben in eingehenden Ring fehlgeschlagen");
            }
        }
    }
}

/// 20ms-Scheduler: zieht bis zu `burst_frames` Frames pro Tick aus dem
/// ausgehenden Ring in einen Staging-Puffer, sendet aber hoechstens einen
/// Frame pro Grid-Slot (§4.1 Burst-Drain). Faellt auf den Stille-Sentinel
/// zurueck, wenn der Puffer leer ist; Sequenz/Timestamp schreiten immer
/// fort.
async fn ausgangs_scheduler(
    call_id: u32,
    socket: Arc<UdpSocket>,
    ring: Arc<AudioRing>,
    peer_addr: Arc<Mutex<Option<SocketAddr>>>,
    stop: Arc<AtomicBool>,
    burst_frames: usize,
    metrics: PipelineMetrics,
) {
    let mut tick = interval(Duration::from_millis(20));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut staging: VecDeque<Vec<u8>> = VecDeque::new();
    let mut seq: u16 = 0;
    let mut timestamp: u32 = 0;
    let ssrc: u32 = 0x5350_4348u32.wrapping_add(call_id);
    let mut started_audio = false;

    while !stop.load(Ordering::SeqCst) {
        tick.tick().await;

        for _ in 0..burst_frames {
            match ring.read_frame() {
                Ok(Some(frame)) => staging.push_back(frame),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(call_id, fehler = %e, "Lesen aus ausgehendem Ring fehlgeschlagen");
                    break;
                }
            }
        }

        let payload: [u8; rtp::PAYLOAD_LEN] = match staging.pop_front() {
            Some(frame) if frame.len() == rtp::PAYLOAD_LEN => {
                let mut arr = [0u8; rtp::PAYLOAD_LEN];
                arr.copy_from_slice(&frame);
                arr
            }
            _ => rtp::SILENCE_FRAME,
        };

        if !started_audio && !rtp::is_silence(&payload) {
            started_audio = true;
            tracing::info!(call_id, ts = timestamp, "started audio");
        }

        metrics.frames_produced_total.inc();
        metrics.ring_occupancy_ratio
            .with_label_values(&[&format!("ap_out_{call_id}")])
            .set(if ring.slot_count() > 0 {
                staging.len() as f64 / ring.slot_count() as f64
            } else {
                0.0
            });

        let packet = rtp::pack(seq, timestamp, ssrc, &payload);
        seq = seq.wrapping_add(1);
        timestamp = timestamp.wrapping_add(rtp::PAYLOAD_LEN as u32);

        if let Some(addr) = *peer_addr.lock() {
            if let Err(e) = socket.send_to(&packet, addr).await {
                tracing::warn!(call_id, fehler = %e, "RTP-Sendung fehlgeschlagen");
            }
        }

        if !ring.peer_is_alive() {
            tracing::warn!(call_id, "Peer-Herzschlag am ausgehenden Ring ueberfaellig, beende Scheduler");
            break;
        }
    }
}
