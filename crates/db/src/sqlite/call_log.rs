//! SQLite-Implementierung des CallLogRepository

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{CallLogAbschluss, CallLogRecord, NeuerCallLog};
use crate::repository::{CallLogRepository, DbResult};
use crate::sqlite::pool::SqliteDb;

impl CallLogRepository for SqliteDb {
    async fn start_call(&self, neu: NeuerCallLog<'_>) -> DbResult<CallLogRecord> {
        let start_str = neu.start_ts.to_rfc3339();
        sqlx::query(
            "INSERT INTO call_log (call_id, caller_number, start_ts, status)
             VALUES (?, ?, ?, 'active')",
        )
        .bind(neu.call_id as i64)
        .bind(neu.caller_number)
        .bind(&start_str)
        .execute(&self.pool)
        .await?;

        Ok(CallLogRecord {
            call_id: neu.call_id,
            caller_number: neu.caller_number.map(|s| s.to_string()),
            start_ts: neu.start_ts,
            end_ts: None,
            transcript: None,
            reply_text: None,
            status: "active".to_string(),
        })
    }

    async fn append_transcript(&self, call_id: u32, delta: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE call_log
             SET transcript = COALESCE(transcript, '') || ?
             WHERE call_id = ?",
        )
        .bind(delta)
        .bind(call_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_reply(&self, call_id: u32, text: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE call_log
             SET reply_text = COALESCE(reply_text || ' ', '') || ?
             WHERE call_id = ?",
        )
        .bind(text)
        .bind(call_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_call(&self, call_id: u32, abschluss: CallLogAbschluss) -> DbResult<()> {
        let end_ts = abschluss.end_ts.unwrap_or_else(Utc::now).to_rfc3339();
        let status = abschluss.status.unwrap_or_else(|| "completed".to_string());
        sqlx::query("UPDATE call_log SET end_ts = ?, status = ? WHERE call_id = ?")
            .bind(&end_ts)
            .bind(&status)
            .bind(call_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load(&self, call_id: u32) -> DbResult<Option<CallLogRecord>> {
        let row = sqlx::query(
            "SELECT call_id, caller_number, start_ts, end_ts, transcript, reply_text, status
             FROM call_log WHERE call_id = ?",
        )
        .bind(call_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        row_to_record(&row).map(Some)
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> DbResult<CallLogRecord> {
    let call_id: i64 = row.try_get("call_id")?;
    let start_str: String = row.try_get("start_ts")?;
    let start_ts = chrono::DateTime::parse_from_rfc3339(&start_str)
        .map_err(|e| DbError::intern(format!("ungueltiger start_ts '{start_str}': {e}")))?
        .with_timezone(&Utc);

    let end_ts = match row.try_get::<Option<String>, _>("end_ts")? {
        Some(s) => Some(
            chrono::DateTime::parse_from_rfc3339(&s)
                .map_err(|e| DbError::intern(format!("ungueltiger end_ts '{s}': {e}")))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(CallLogRecord {
        call_id: call_id as u32,
        caller_number: row.try_get("caller_number")?,
        start_ts,
        end_ts,
        transcript: row.try_get("transcript")?,
        reply_text: row.try_get("reply_text")?,
        status: row.try_get("status")?,
    })
}
