use telefonkern_db::repository::ConfigRepository;
use telefonkern_db::SqliteDb;

#[tokio::test]
async fn get_setzt_und_liest_zurueck() {
    let db = SqliteDb::in_memory().await.expect("in_memory");
    assert!(db.get("voice_id").await.expect("get").is_none());

    let entry = db.set("voice_id", "de-DE-standard").await.expect("set");
    assert_eq!(entry.value, "de-DE-standard");

    let loaded = db.get("voice_id").await.expect("get").expect("present");
    assert_eq!(loaded.value, "de-DE-standard");
}

#[tokio::test]
async fn set_ueberschreibt_vorhandenen_schluessel() {
    let db = SqliteDb::in_memory().await.expect("in_memory");
    db.set("asr_model_path", "/models/a").await.expect("set 1");
    db.set("asr_model_path", "/models/b").await.expect("set 2");

    let loaded = db.get("asr_model_path").await.expect("get").expect("present");
    assert_eq!(loaded.value, "/models/b");
}

#[tokio::test]
async fn all_liefert_alle_eintraege_sortiert() {
    let db = SqliteDb::in_memory().await.expect("in_memory");
    db.set("vad.threshold", "0.02").await.expect("set 1");
    db.set("enable_transcriber", "true").await.expect("set 2");

    let entries = db.all().await.expect("all");
    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["enable_transcriber", "vad.threshold"]);
}
