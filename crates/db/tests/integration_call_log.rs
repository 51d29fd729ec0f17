use chrono::Utc;
use telefonkern_db::models::{CallLogAbschluss, NeuerCallLog};
use telefonkern_db::repository::CallLogRepository;
use telefonkern_db::SqliteDb;

#[tokio::test]
async fn anruf_lebenszyklus() {
    let db = SqliteDb::in_memory().await.expect("in_memory");

    let record = db
        .start_call(NeuerCallLog {
            call_id: 42,
            caller_number: Some("+491701234567"),
            start_ts: Utc::now(),
        })
        .await
        .expect("start_call");
    assert_eq!(record.status, "active");
    assert!(record.end_ts.is_none());

    db.append_transcript(42, "Hello").await.expect("transcript 1");
    db.append_transcript(42, " world").await.expect("transcript 2");
    db.append_reply(42, "Hi there").await.expect("reply");

    db.finish_call(
        42,
        CallLogAbschluss {
            end_ts: Some(Utc::now()),
            status: Some("completed".to_string()),
        },
    )
    .await
    .expect("finish_call");

    let loaded = db.load(42).await.expect("load").expect("present");
    assert_eq!(loaded.transcript.as_deref(), Some("Hello world"));
    assert_eq!(loaded.reply_text.as_deref(), Some("Hi there"));
    assert_eq!(loaded.status, "completed");
    assert!(loaded.end_ts.is_some());
}

#[tokio::test]
async fn unbekannter_anruf_liefert_none() {
    let db = SqliteDb::in_memory().await.expect("in_memory");
    assert!(db.load(999).await.expect("load").is_none());
}
