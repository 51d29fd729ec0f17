//! Sitzungstabelle, angelegt bei HELLO von T auf dem festen TCP-Port,
//! abgebaut bei BYE, Lesefehler oder 30s Inaktivitaet (§4.4) — nicht bei
//! ACTIVATE/DEACTIVATE. Haelt Text-Puffer, Half-Duplex-Sperrfrist und die
//! eifrige Ausgangsverbindung zu S je Anruf.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use telefonkern_core::types::CallId;
use telefonkern_db::models::{CallLogAbschluss, NeuerCallLog};
use telefonkern_db::repository::CallLogRepository;
use telefonkern_db::SqliteDb;
use telefonkern_engine::llm::{half_duplex_duration, ConversationState, LlmEngine};
use telefonkern_observability::PipelineMetrics;
use telefonkern_protocol::chunk;
use telefonkern_protocol::retry::connect_with_retry;
use telefonkern_protocol::wire;

use crate::config::ReasonerConfig;

/// Geteilter Zustand einer Sitzung: der Lese-Task schreibt den Puffer und
/// generiert Antworten inline, der Leerlauf-Waechter liest Aktivitaet und
/// stoesst die Stille-Regel auch ohne neues Delta an.
struct SitzungsKern {
    puffer: SyncMutex<String>,
    last_text_time_ms: AtomicI64,
    half_duplex_until_ms: AtomicI64,
    disconnect: AtomicBool,
    s_stream: AsyncMutex<Option<TcpStream>>,
    gespraech: SyncMutex<ConversationState>,
}

impl SitzungsKern {
    fn neu(persona: String) -> Self {
        Self {
            puffer: SyncMutex::new(String::new()),
            last_text_time_ms: AtomicI64::new(jetzt_unix_ms()),
            half_duplex_until_ms: AtomicI64::new(0),
            disconnect: AtomicBool::new(false),
            s_stream: AsyncMutex::new(None),
            gespraech: SyncMutex::new(ConversationState::new(persona)),
        }
    }

    fn beruehren(&self) {
        self.last_text_time_ms
            .store(jetzt_unix_ms(), Ordering::SeqCst);
    }

    fn leerlauf_seit_ms(&self) -> i64 {
        jetzt_unix_ms() - self.last_text_time_ms.load(Ordering::SeqCst)
    }
}

fn jetzt_unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn endet_auf_satzzeichen(trimmed: &str) -> bool {
    matches!(trimmed.chars().last(), Some('.') | Some('!') | Some('?'))
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

/// Laeuft fuer die Lebensdauer des Prozesses: akzeptiert T's Verbindungen auf
/// dem festen Reasoner-Port und legt pro HELLO eine Sitzung an (§4.4, §4.7).
pub async fn annahme_schleife(
    config: Arc<ReasonerConfig>,
    sitzungen: SessionTable,
    llm: LlmEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
) {
    let bind_addr = format!("0.0.0.0:{}", config.ports.reasoner_tcp_port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(fehler = %e, addr = %bind_addr, "Reasoner-TCP-Server konnte nicht gebunden werden");
            return;
        }
    };
    tracing::info!(addr = %bind_addr, "Reasoner-TCP-Server fuer T gebunden");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(fehler = %e, "Annehmen einer T-Verbindung fehlgeschlagen");
                continue;
            }
        };

        tokio::spawn(behandle_verbindung(
            stream,
            peer,
            Arc::clone(&config),
            Arc::clone(&sitzungen),
            llm.clone(),
            Arc::clone(&db),
            metrics.clone(),
        ));
    }
}

async fn behandle_verbindung(
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
    config: Arc<ReasonerConfig>,
    sitzungen: SessionTable,
    llm: LlmEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
) {
    let call_id = match wire::read_hello(&mut stream).await {
        Ok(c) => c.inner(),
        Err(e) => {
            tracing::warn!(fehler = %e, peer = %peer, "HELLO-Lesen von T fehlgeschlagen");
            return;
        }
    };

    if sitzungen.contains_key(&call_id) {
        tracing::warn!(call_id, "Sitzung existiert bereits, verwerfe doppelte T-Verbindung");
        return;
    }

    tracing::info!(call_id, peer = %peer, "T verbunden");

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

    let kern = Arc::new(SitzungsKern::neu(config.dialog.persona.clone()));
    verbinde_mit_s(call_id, &config, &kern).await;

    let task = tokio::spawn(lese_schleife(
        call_id,
        stream,
        Arc::clone(&config),
        llm,
        Arc::clone(&db),
        metrics,
        Arc::clone(&kern),
        Arc::clone(&sitzungen),
    ));

    sitzungen.insert(call_id, Session { kern, task });
}

/// Liest Text-Deltas von T bis BYE oder Lesefehler. Setzt bei Ende das
/// `disconnect`-Flag, bevor der Sitzungsabbau beginnt — jede zu diesem
/// Zeitpunkt noch laufende `versuche_antwort` bricht dadurch vor dem Senden
/// an S ab (§4.4 Kuendigung bei Disconnect).
async fn lese_schleife(
    call_id: u32,
    mut stream: TcpStream,
    config: Arc<ReasonerConfig>,
    llm: LlmEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
    kern: Arc<SitzungsKern>,
    sitzungen: SessionTable,
) {
    loop {
        match wire::read_frame(&mut stream, wire::DEFAULT_MAX_FRAME_SIZE).await {
            Ok(wire::Frame::Payload(payload)) => {
                let delta = chunk::decode_text(&payload);
                kern.beruehren();
                fuege_delta_hinzu(&kern, &delta);
                versuche_antwort(call_id, &config, &llm, &db, &metrics, &kern).await;
            }
            Ok(wire::Frame::Bye) => {
                tracing::info!(call_id, "BYE von T erhalten");
                break;
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "Lesen von T fehlgeschlagen");
                break;
            }
        }
    }

    kern.disconnect.store(true, Ordering::SeqCst);
    beende_sitzung(call_id, &db, &sitzungen, &kern, "completed").await;
}

fn fuege_delta_hinzu(kern: &SitzungsKern, delta: &str) {
    if delta.is_empty() {
        return;
    }
    let mut puffer = kern.puffer.lock();
    if !puffer.is_empty() {
        puffer.push(' ');
    }
    puffer.push_str(delta);
}

/// Zug-Erkennung und Antwortgenerierung (§4.4). Satzzeichen-Regel: der
/// getrimmte Puffer endet auf `.`/`!`/`?` -> sofort faellig. Stille-Regel:
/// sonst faellig, sobald seit dem letzten Delta die Schwelle verstrichen ist.
/// Half-Duplex-Gate unterdrueckt beides, solange die Sperrfrist laeuft. Wird
/// sowohl aus der Lese-Schleife (bei jedem Delta) als auch periodisch vom
/// Leerlauf-Waechter aufgerufen, damit die Stille-Regel auch ohne ein
/// weiteres eintreffendes Delta greifen kann.
async fn versuche_antwort(
    call_id: u32,
    config: &ReasonerConfig,
    llm: &LlmEngine,
    db: &Arc<SqliteDb>,
    metrics: &PipelineMetrics,
    kern: &Arc<SitzungsKern>,
) {
    if kern.disconnect.load(Ordering::SeqCst) {
        return;
    }

    let now = jetzt_unix_ms();
    if now < kern.half_duplex_until_ms.load(Ordering::SeqCst) {
        return;
    }

    let snapshot = {
        let mut puffer = kern.puffer.lock();
        let trimmed = puffer.trim();
        if trimmed.is_empty() {
            return;
        }

        let faellig = endet_auf_satzzeichen(trimmed)
            || (now - kern.last_text_time_ms.load(Ordering::SeqCst))
                >= config.dialog.silence_schwelle_ms as i64;
        if !faellig {
            return;
        }

        let snapshot = trimmed.to_string();
        puffer.clear();
        snapshot
    };

    let gespraech = kern.gespraech.lock().clone();
    let antwort = match llm.reply(call_id, gespraech, &snapshot).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(call_id, fehler = %e, "LLM-Antwort fehlgeschlagen, Zug wird ausgelassen");
            return;
        }
    };

    if kern.disconnect.load(Ordering::SeqCst) {
        tracing::debug!(call_id, "Anrufer bereits weg, verwerfe LLM-Antwort ohne Versand");
        return;
    }

    // Nur R's eigener Gespraechs-Kontext wird hier fortgeschrieben; das
    // persistierte Transkript bleibt T's alleiniger Schreibzugriff, R's
    // alleiniger DB-Schreibzugriff ist `append_reply` (§5 Shared-resource
    // policy).
    {
        let mut gespraech_mut = kern.gespraech.lock();
        if !gespraech_mut.transcript.is_empty() {
            gespraech_mut.transcript.push('\n');
        }
        gespraech_mut
            .transcript
            .push_str(&format!("Caller: {snapshot}\nAssistant: {antwort}"));
    }

    if let Err(e) = db.append_reply(call_id, &antwort).await {
        tracing::warn!(call_id, fehler = %e, "Antwort-Append fehlgeschlagen");
    }

    sende_an_s(call_id, config, kern, &antwort, metrics).await;

    let sperrfrist = half_duplex_duration(antwort.chars().count());
    kern.half_duplex_until_ms
        .store(jetzt_unix_ms() + sperrfrist.as_millis() as i64, Ordering::SeqCst);
}

/// Eroeffnet die eifrige Ausgangsverbindung zu S bei Sitzungsanlage, ohne auf
/// die erste Antwort zu warten (§4.7).
async fn verbinde_mit_s(call_id: u32, config: &ReasonerConfig, kern: &SitzungsKern) {
    let synth_addr = format!(
        "{}:{}",
        config.registrierung.synthesizer_host, config.ports.synthesizer_tcp_port
    );

    match connect_with_retry("R-S-Verbindung", |_| TcpStream::connect(synth_addr.clone())).await {
        Ok(mut stream) => match wire::write_hello(&mut stream, CallId(call_id)).await {
            Ok(()) => {
                *kern.s_stream.lock().await = Some(stream);
                tracing::info!(call_id, "Eifrige Verbindung zu S hergestellt");
            }
            Err(e) => {
                tracing::warn!(call_id, fehler = %e, "HELLO an S fehlgeschlagen, Sitzung startet ohne S-Verbindung");
            }
        },
        Err(e) => {
            tracing::warn!(call_id, fehler = %e, "Verbindung zu S endgueltig fehlgeschlagen, Sitzung startet ohne S-Verbindung");
        }
    }
}

/// Sendet eine fertige Antwort an S. Bei Schreibfehler ein voller
/// Retry-Durchlauf (§4.4: anders als T's Einmal-Reconnect gegenueber R);
/// scheitert der, wird genau diese Antwort verworfen und die Sitzung laeuft
/// fuer den naechsten Zug unveraendert weiter.
async fn sende_an_s(
    call_id: u32,
    config: &ReasonerConfig,
    kern: &SitzungsKern,
    text: &str,
    metrics: &PipelineMetrics,
) {
    let payload = chunk::encode_text(text);

    {
        let mut guard = kern.s_stream.lock().await;
        if let Some(stream) = guard.as_mut() {
            if wire::write_payload(stream, &payload).await.is_ok() {
                return;
            }
            *guard = None;
        }
    }

    tracing::warn!(call_id, "Verbindung zu S verloren, versuche vollen Reconnect");
    let synth_addr = format!(
        "{}:{}",
        config.registrierung.synthesizer_host, config.ports.synthesizer_tcp_port
    );

    match connect_with_retry("R-S-Wiederverbindung", |_| {
        TcpStream::connect(synth_addr.clone())
    })
    .await
    {
        Ok(mut stream) => {
            let ok = wire::write_hello(&mut stream, CallId(call_id)).await.is_ok()
                && wire::write_payload(&mut stream, &payload).await.is_ok();
            if ok {
                *kern.s_stream.lock().await = Some(stream);
            } else {
                metrics.retry_exhausted_total.inc();
                tracing::warn!(call_id, "Senden an S nach Reconnect fehlgeschlagen, Antwort wird verworfen");
            }
        }
        Err(e) => {
            metrics.retry_exhausted_total.inc();
            tracing::warn!(call_id, fehler = %e, "Wiederholungen an S erschoepft, Antwort wird verworfen");
        }
    }
}

async fn beende_sitzung(
    call_id: u32,
    db: &Arc<SqliteDb>,
    sitzungen: &SessionTable,
    kern: &SitzungsKern,
    status: &str,
) {
    {
        let mut guard = kern.s_stream.lock().await;
        if let Some(stream) = guard.as_mut() {
            let _ = wire::write_bye(stream).await;
        }
    }

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

/// Laeuft im Hintergrund: stoesst pro Sitzung `versuche_antwort` an, damit die
/// Stille-Regel auch ohne ein weiteres eintreffendes Delta greift, und raeumt
/// Sitzungen ab, die laenger als `leerlauf_grenze_sekunden` keine Aktivitaet
/// mehr gesehen haben — der 30s-Backstop aus §4.4/§5.
pub async fn leerlauf_waechter(
    config: Arc<ReasonerConfig>,
    sitzungen: SessionTable,
    llm: LlmEngine,
    db: Arc<SqliteDb>,
    metrics: PipelineMetrics,
) {
    let intervall = Duration::from_millis(config.dialog.wache_intervall_ms.max(50));
    let grenze_ms = (config.dialog.leerlauf_grenze_sekunden * 1000) as i64;

    loop {
        tokio::time::sleep(intervall).await;

        let call_ids: Vec<u32> = sitzungen.iter().map(|e| *e.key()).collect();
        for call_id in call_ids {
            let (kern, beendet) = match sitzungen.get(&call_id) {
                Some(e) => (Arc::clone(&e.kern), e.task.is_finished()),
                None => continue,
            };

            if beendet || kern.leerlauf_seit_ms() > grenze_ms {
                if let Some((_, session)) = sitzungen.remove(&call_id) {
                    session.stop();
                }
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
                continue;
            }

            versuche_antwort(call_id, &config, &llm, &db, &metrics, &kern).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telefonkern_engine::testing::{FailingLlm, FakeLlm};

    #[tokio::test]
    async fn sitzungstabelle_ist_anfangs_leer() {
        let t = neue_sitzungstabelle();
        assert!(t.is_empty());
    }

    #[test]
    fn satzzeichen_erkennung() {
        assert!(endet_auf_satzzeichen("Hello there."));
        assert!(endet_auf_satzzeichen("Really?"));
        assert!(!endet_auf_satzzeichen("still talking"));
    }

    #[tokio::test]
    async fn punktuation_loest_sofortige_antwort_aus() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        db.start_call(NeuerCallLog {
            call_id: 1,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let llm = LlmEngine::new(Box::new(FakeLlm::default()));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = ReasonerConfig::default();
        let kern = Arc::new(SitzungsKern::neu(config.dialog.persona.clone()));

        fuege_delta_hinzu(&kern, "Is the office open today?");
        kern.beruehren();
        versuche_antwort(1, &config, &llm, &db, &metrics, &kern).await;

        assert!(kern.puffer.lock().is_empty());
        let record = db.load(1).await.unwrap().unwrap();
        assert!(record.reply_text.unwrap().starts_with("echo: "));
        assert!(kern.half_duplex_until_ms.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn ohne_satzzeichen_und_ohne_stille_bleibt_antwort_aus() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        db.start_call(NeuerCallLog {
            call_id: 2,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let llm = LlmEngine::new(Box::new(FakeLlm::default()));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = ReasonerConfig::default();
        let kern = Arc::new(SitzungsKern::neu(config.dialog.persona.clone()));

        fuege_delta_hinzu(&kern, "still thinking out loud");
        kern.beruehren();
        versuche_antwort(2, &config, &llm, &db, &metrics, &kern).await;

        assert_eq!(*kern.puffer.lock(), "still thinking out loud");
        let record = db.load(2).await.unwrap().unwrap();
        assert!(record.reply_text.is_none());
    }

    #[tokio::test]
    async fn disconnect_verwirft_puffer_ohne_antwort() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        db.start_call(NeuerCallLog {
            call_id: 3,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let llm = LlmEngine::new(Box::new(FakeLlm::default()));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = ReasonerConfig::default();
        let kern = Arc::new(SitzungsKern::neu(config.dialog.persona.clone()));

        fuege_delta_hinzu(&kern, "Hello?");
        kern.disconnect.store(true, Ordering::SeqCst);
        versuche_antwort(3, &config, &llm, &db, &metrics, &kern).await;

        let record = db.load(3).await.unwrap().unwrap();
        assert!(record.reply_text.is_none());
    }

    #[tokio::test]
    async fn llm_fehler_laesst_sitzung_unberuehrt() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        db.start_call(NeuerCallLog {
            call_id: 4,
            caller_number: None,
            start_ts: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let llm = LlmEngine::new(Box::new(FailingLlm));
        let metrics = PipelineMetrics::neu().unwrap();
        let config = ReasonerConfig::default();
        let kern = Arc::new(SitzungsKern::neu(config.dialog.persona.clone()));

        fuege_delta_hinzu(&kern, "This will fail.");
        kern.beruehren();
        versuche_antwort(4, &config, &llm, &db, &metrics, &kern).await;

        let record = db.load(4).await.unwrap().unwrap();
        assert!(record.reply_text.is_none());
        assert_eq!(kern.half_duplex_until_ms.load(Ordering::SeqCst), 0);
    }
}
