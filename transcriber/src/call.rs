//! Sitzungstabelle, angelegt bei REGISTER von IAP, abgebaut bei BYE oder
//! 30s Inaktivitaet (§4.3) — nicht bei ACTIVATE/DEACTIVATE.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use telefonkern_core::types::CallId;
use telefonkern_db::models::{CallLogAbschluss, NeuerCallLog};
use telefonkern_db::repository::CallLogRepository;
use telefonkern_db::SqliteDb;
use telefonkern_engine::asr::AsrEngine;
use telefonkern_engine::postprocess::{merge_cumulative_delta, post_process};
use telefonkern_observability::PipelineMetrics;
use telefonkern_protocol::chunk;
use telefonkern_protocol::registration::RegistrationMessage;
use telefonkern_protocol::retry::connect_with_retry;
use telefonkern_protocol::wire;

use crate::config::TranscriberConfig;

/// Geteilter Zustand einer Sitzung, von der Sitzungsschleife geschrieben und
/// von der Leerlauf-Waechter-Schleife gelesen.
struct SitzungsKern {
    /// Kumulativer post-prozessierter Transkript-Text ueber alle Chunks
    /// dieser Sitzung hinweg, nicht nur der letzte Chunk isoliert — noetig,
    /// damit `merge_cumulative_delta` die wortweise Ueberlappung an der
    /// VAD-Chunk-Grenze erkennen kann.
    last_emitted: SyncMutex<String>,
    last_activity_unix_ms: AtomicI64,
    r_stream: AsyncMutex<Option<TcpStream>>,
    r_verbunden: AtomicBool,
}

impl SitzungsKern {
    fn neu() -> Self {
        Self {
            last_emitted: SyncMutex::new(String::new()),
            last_activity_unix_ms: AtomicI64::new(jetzt_unix_ms()),
            r_stream: AsyncMutex::new(None),
            r_verbunden: AtomicBool::new(false),
        }
    }

    fn beruehren(&self) {
        self.last_activity_unix_ms
            .store(jetzt_unix_ms(), Ordering::Relaxed);
    }

    fn leerlauf_seit_ms(&self) -> i64 {
        jetzt_unix_ms() - self.last_activity_unix_ms.load(Ordering::Relaxed)
    }
}

fn jetzt_unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
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

/// Laeuft fuer die Lebensdauer des Prozesses: nimmt REGISTER-Pakete von IAP
/// entgegen und legt pro neuer Call-ID eine Sitzung an (§4.3, §4.7).
pub async fn registrierungs_schleife(
    config: Arc<TranscriberConfig>,
    sitzungen: SessionTable,
    asr: AsrEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
) {
    let bind_addr = format!("0.0.0.0:{}", config.ports.transcriber_udp_port);
    let socket = match UdpSocket::bind(&bind_addr).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(fehler = %e, addr = %bind_addr, "UDP-Registrierungssocket konnte nicht gebunden werden");
            return;
        }
    };
    tracing::info!(addr = %bind_addr, "Registrierungssocket fuer IAP gebunden");

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
                if sitzungen.contains_key(&c) {
                    continue;
                }
                tracing::info!(call_id = c, von = %peer, "REGISTER von IAP erhalten");
                let session = erstelle_sitzung(
                    c,
                    Arc::clone(&config),
                    asr.clone(),
                    Arc::clone(&db),
                    metrics.clone(),
                    Arc::clone(&sitzungen),
                );
                sitzungen.insert(c, session);
                metrics.active_sessions.set(sitzungen.len() as f64);
            }
            Some(RegistrationMessage::Bye(_)) => {
                // BYE kommt ueber die TCP-Verbindung zu IAP selbst an
                // (Frame::Bye); das UDP-BYE ist nur Best-Effort-Hygiene
                // auf IAP-Seite und braucht hier keine Aktion.
            }
            None => {
                tracing::warn!(von = %peer, "Unlesbares Registrierungspaket");
            }
        }
    }
}

fn erstelle_sitzung(
    call_id: u32,
    config: Arc<TranscriberConfig>,
    asr: AsrEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
    sitzungen: SessionTable,
) -> Session {
    let kern = Arc::new(SitzungsKern::neu());
    let task = tokio::spawn(sitzungs_schleife(
        call_id,
        config,
        asr,
        db,
        metrics,
        Arc::clone(&kern),
        sitzungen,
    ));
    Session { kern, task }
}

async fn sitzungs_schleife(
    call_id: u32,
    config: Arc<TranscriberConfig>,
    asr: AsrEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
    kern: Arc<SitzungsKern>,
    sitzungen: SessionTable,
) {
    if let Err(e) = db
        .start_call(NeuerCallLog {
            call_id,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
    {
        tracing::warn!(call_id, fehler = %e, "Anruf-Log konnte nicht angelegt werden");
    }

    verbinde_mit_r(call_id, &config, &kern).await;

    let iap_addr = format!(
        "{}:{}",
        config.registrierung.iap_host,
        config.ports.iap_audio_port(CallId(call_id))
    );

    let mut iap_stream =
        match connect_with_retry("T-IAP-Verbindung", |_| TcpStream::connect(iap_addr.clone()))
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(call_id, fehler = %e, "Verbindung zu IAP endgueltig fehlgeschlagen");
                beende_sitzung(call_id, &db, &sitzungen, "verbindungsfehler").await;
                return;
            }
        };

    if let Err(e) = wire::write_hello(&mut iap_stream, CallId(call_id)).await {
        tracing::error!(call_id, fehler = %e, "HELLO an IAP fehlgeschlagen");
        beende_sitzung(call_id, &db, &sitzungen, "verbindungsfehler").await;
        return;
    }
    tracing::info!(call_id, "Verbindung zu IAP hergestellt");

    loop {
        let frame = match wire::read_frame(&mut iap_stream, wire::DEFAULT_MAX_FRAME_SIZE).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Lesen von IAP fehlgeschlagen");
                break;
            }
        };

        match frame {
            wire::Frame::Payload(payload) => {
                kern.beruehren();
                let samples = chunk::decode_chunk(&payload);
                verarbeite_chunk(call_id, &config, &asr, &db, &metrics, &kern, samples).await;
            }
            wire::Frame::Bye => {
                tracing::info!(call_id, "BYE von IAP erhalten");
                break;
            }
        }
    }

    beende_sitzung(call_id, &db, &sitzungen, "completed").await;
}

async fn verarbeite_chunk(
    call_id: u32,
    config: &TranscriberConfig,
    asr: &AsrEngine,
    db: &Arc<SqliteDb>,
    metrics: &PipelineMetrics,
    kern: &Arc<SitzungsKern>,
    samples: Vec<f32>,
) {
    let roh = match asr.transcribe(call_id, samples, "en").await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(call_id, fehler = %e, "ASR fehlgeschlagen, Chunk wird uebersprungen");
            return;
        }
    };

    let verarbeitet = post_process(&roh);
    let (delta, war_leer) = {
        let mut cumulative = kern.last_emitted.lock();
        let war_leer = cumulative.is_empty();
        let (neues_kumulativ, delta) = merge_cumulative_delta(&cumulative, &verarbeitet);
        *cumulative = neues_kumulativ;
        (delta, war_leer)
    };

    if delta.is_empty() {
        return;
    }

    // Das Transkript in der DB ist eine rohe Verkettung ohne eigene
    // Trennzeichenlogik (anders als R's Puffer in `fuege_delta_hinzu`), daher
    // braucht jedes Delta ausser dem allerersten ein fuehrendes Leerzeichen.
    let delta_fuer_db = if war_leer {
        delta.clone()
    } else {
        format!(" {delta}")
    };
    if let Err(e) = db.append_transcript(call_id, &delta_fuer_db).await {
        tracing::warn!(call_id, fehler = %e, "Transkript-Append fehlgeschlagen");
    }

    sende_an_r(call_id, config, kern, &delta, metrics).await;
}

/// Eroeffnet die eifrige Ausgangsverbindung zu R bei Sitzungsanlage, ohne
/// auf die erste Transkription zu warten (§4.7).
async fn verbinde_mit_r(call_id: u32, config: &TranscriberConfig, kern: &SitzungsKern) {
    let reasoner_addr = format!(
        "{}:{}",
        config.registrierung.reasoner_host, config.ports.reasoner_tcp_port
    );

    match connect_with_retry("T-R-Verbindung", |_| TcpStream::connect(reasoner_addr.clone())).await
    {
        Ok(mut stream) => match wire::write_hello(&mut stream, CallId(call_id)).await {
            Ok(()) => {
                *kern.r_stream.lock().await = Some(stream);
                kern.r_verbunden.store(true, Ordering::SeqCst);
                tracing::info!(call_id, "Eifrige Verbindung zu R hergestellt");
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "HELLO an R fehlgeschlagen, Sitzung startet getrennt");
            }
        },
        Err(e) => {
            tracing::warn!(call_id, fehler = %e, "Verbindung zu R endgueltig fehlgeschlagen, Sitzung startet getrennt");
        }
    }
}

/// Sendet ein Text-Delta an R. Bei Schreibfehler genau ein Reconnect-Versuch
/// (§4.3); schlaegt der fehl, werden weitere Sends unterdrueckt, bis ein
/// spaeterer Versuch wieder anschliesst. ASR und Transkript-Persistenz
/// laufen davon unbeeinflusst weiter.
async fn sende_an_r(
    call_id: u32,
    config: &TranscriberConfig,
    kern: &SitzungsKern,
    delta: &str,
    metrics: &PipelineMetrics,
) {
    let payload = chunk::encode_text(delta);
    let mut guard = kern.r_stream.lock().await;

    if let Some(stream) = guard.as_mut() {
        if wire::write_payload(stream, &payload).await.is_ok() {
            return;
        }
    }

    let war_verbunden = kern.r_verbunden.swap(false, Ordering::SeqCst);
    *guard = None;
    if war_verbunden {
        tracing::warn!(call_id, "Verbindung zu R verloren, versuche einmaligen Reconnect");
    }

    let reasoner_addr = format!(
        "{}:{}",
        config.registrierung.reasoner_host, config.ports.reasoner_tcp_port
    );

    match TcpStream::connect(&reasoner_addr).await {
        Ok(mut stream) => {
            let verbunden = wire::write_hello(&mut stream, CallId(call_id)).await.is_ok()
                && wire::write_payload(&mut stream, &payload).await.is_ok();
            if verbunden {
                kern.r_verbunden.store(true, Ordering::SeqCst);
                *guard = Some(stream);
            } else if war_verbunden {
                metrics.retry_exhausted_total.inc();
                tracing::warn!(call_id, "Reconnect zu R fehlgeschlagen, Sends bleiben unterdrueckt");
            }
        }
        Err(e) => {
            if war_verbunden {
                metrics.retry_exhausted_total.inc();
                tracing::warn!(call_id, fehler = %e, "Reconnect zu R fehlgeschlagen, Sends bleiben unterdrueckt");
            }
        }
    }
}

async fn beende_sitzung(
    call_id: u32,
    db: &Arc<SqliteDb>,
    sitzungen: &SessionTable,
    status: &str,
) {
    if let Err(e) = db
        .finish_call(
            call_id,
            CallLogAbschluss {
                end_ts: Some(chrono::Utc::now()),
                status: Some(status.to_string()),
            },
        )
        .await
    {
        tracing::warn!(call_id, fehler = %e, "Anruf-Log-Abschluss fehlgeschlagen");
    }
    sitzungen.remove(&call_id);
    tracing::info!(call_id, status, "Sitzung beendet");
}

/// Laeuft im Hintergrund und raeumt Sitzungen ab, die laenger als
/// `leerlauf_grenze_sekunden` keinen Chunk mehr gesehen haben — der
/// 30s-Backstop aus §4.3. Die Sitzungsschleife selbst raeumt sich bei BYE
/// oder einem Lesefehler bereits ueber `beende_sitzung` ab; dieser Scan
/// greift nur fuer Sitzungen, deren IAP-Verbindung lautlos verstummt ist,
/// ohne dass ihre TCP-Lektuere das je bemerkt (z. B. eine haengende, aber
/// nicht geschlossene Verbindung).
pub async fn leerlauf_waechter(
    config: Arc<TranscriberConfig>,
    sitzungen: SessionTable,
    db: Arc<SqliteDb>,
) {
    let intervall = Duration::from_secs(config.sitzung.scan_intervall_sekunden.max(1));
    let grenze_ms = (config.sitzung.leerlauf_grenze_sekunden * 1000) as i64;

    loop {
        tokio::time::sleep(intervall).await;

        let abgelaufene: Vec<u32> = sitzungen
            .iter()
            .filter(|e| e.value().task.is_finished() || e.value().kern.leerlauf_seit_ms() > grenze_ms)
            .map(|e| *e.key())
            .collect();

        for call_id in abgelaufene {
            if let Some((_, session)) = sitzungen.remove(&call_id) {
                session.stop();
            }
            // Kann auf eine bereits (von der Sitzungsschleife selbst)
            // abgeschlossene Zeile treffen, falls die Taskbeendigung knapp
            // vor diesem Scan lag — harmlos, `finish_call` ist idempotent
            // genug fuer einen redundanten Statuswechsel.
            if let Err(e) = db
                .finish_call(
                    call_id,
                    CallLogAbschluss {
                        end_ts: Some(chrono::Utc::now()),
                        status: Some("leerlauf".to_string()),
                    },
                )
                .await
            {
                tracing::debug!(call_id, fehler = %e, "Leerlauf-Abschluss im Anruf-Log fehlgeschlagen");
            }
            tracing::info!(call_id, "Sitzung wegen Leerlauf oder Taskende entfernt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telefonkern_engine::testing::FakeAsr;

    #[tokio::test]
    async fn sitzungstabelle_ist_anfangs_leer() {
        let t = neue_sitzungstabelle();
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn chunk_verarbeitung_erzeugt_transkript_delta() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        db.start_call(NeuerCallLog {
            call_id: 1,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let asr = AsrEngine::new(Box::new(FakeAsr));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = TranscriberConfig::default();
        let kern = Arc::new(SitzungsKern::neu());

        verarbeite_chunk(1, &config, &asr, &db, &metrics, &kern, vec![0.0; 160]).await;

        let record = db.load(1).await.unwrap().unwrap();
        assert!(record.transcript.unwrap().contains("transcribed"));
    }

    struct SequencedAsr {
        texte: std::collections::VecDeque<&'static str>,
    }
    impl telefonkern_engine::asr::AsrPrimitive for SequencedAsr {
        fn asr(&mut self, _pcm16k_mono: &[f32], _language: &str) -> anyhow::Result<String> {
            Ok(self.texte.pop_front().unwrap_or_default().to_string())
        }
    }

    #[tokio::test]
    async fn ueberlappende_chunks_dupliziere_das_ueberlappwort_nicht() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        db.start_call(NeuerCallLog {
            call_id: 1,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let asr = AsrEngine::new(Box::new(SequencedAsr {
            texte: std::collections::VecDeque::from([
                "the birch canoe slid on the smooth",
                "smooth planks",
            ]),
        }));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = TranscriberConfig::default();
        let kern = Arc::new(SitzungsKern::neu());

        verarbeite_chunk(1, &config, &asr, &db, &metrics, &kern, vec![0.0; 160]).await;
        verarbeite_chunk(1, &config, &asr, &db, &metrics, &kern, vec![0.0; 160]).await;

        let record = db.load(1).await.unwrap().unwrap();
        let transcript = record.transcript.unwrap();
        assert!(!transcript.to_ascii_lowercase().contains("smooth planks smooth"));
        assert!(transcript.to_ascii_lowercase().ends_with("smooth planks"));
    }
}
