//! TCP-Connect-Retry-Policy (§4.7)
//!
//! Bis zu 10 Versuche; 200 ms zwischen Versuch 1–5, 1000 ms zwischen 6–10.
//! Nur Versuch 1, 5 und 9 werden geloggt, um Log-Spam zu vermeiden. Nach
//! Erschoepfung entscheidet der Aufrufer ueber Drop oder Degradierung –
//! diese Funktion gibt lediglich Erfolg/Fehlschlag zurueck.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

pub const MAX_ATTEMPTS: u32 = 10;

/// Wartezeit vor Versuch `attempt` (1-basiert). Versuch 1 hat keine Wartezeit davor.
pub fn delay_before_attempt(attempt: u32) -> Duration {
    if attempt <= 1 {
        Duration::ZERO
    } else if attempt <= 5 {
        Duration::from_millis(200)
    } else {
        Duration::from_millis(1000)
    }
}

/// Ob dieser Versuch geloggt werden soll (1, 5, 9).
pub fn should_log_attempt(attempt: u32) -> bool {
    matches!(attempt, 1 | 5 | 9)
}

/// Fuehrt `connect` bis zu `MAX_ATTEMPTS` mal aus, mit der §4.7-Wartezeit
/// zwischen Versuchen. `connect` bekommt die 1-basierte Versuchsnummer.
pub async fn connect_with_retry<F, Fut, T, E>(
    kontext: &str,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut letzter_fehler = None;
    for attempt in 1..=MAX_ATTEMPTS {
        sleep(delay_before_attempt(attempt)).await;
        match connect(attempt).await {
            Ok(v) => {
                if attempt > 1 {
                    tracing::info!(kontext, attempt, "Verbindung nach Wiederholung hergestellt");
                }
                return Ok(v);
            }
            Err(e) => {
                if should_log_attempt(attempt) {
                    tracing::warn!(kontext, attempt, fehler = %e, "Verbindungsversuch fehlgeschlagen");
                }
                letzter_fehler = Some(e);
            }
        }
    }
    Err(letzter_fehler.expect("mindestens ein Versuch wurde unternommen"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn wartezeit_phasen() {
        assert_eq!(delay_before_attempt(1), Duration::ZERO);
        assert_eq!(delay_before_attempt(2), Duration::from_millis(200));
        assert_eq!(delay_before_attempt(5), Duration::from_millis(200));
        assert_eq!(delay_before_attempt(6), Duration::from_millis(1000));
        assert_eq!(delay_before_attempt(10), Duration::from_millis(1000));
    }

    #[test]
    fn log_nur_bei_1_5_9() {
        for a in 1..=10 {
            assert_eq!(should_log_attempt(a), matches!(a, 1 | 5 | 9));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn erfolg_beim_ersten_versuch() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = connect_with_retry("test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(attempt, 1);
                Ok(123)
            }
        })
        .await;
        assert_eq!(result, Ok(123));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn erschoepfung_nach_zehn_versuchen() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = connect_with_retry("test", |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err("refused") }
        })
        .await;
        assert_eq!(result, Err("refused"));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn erfolg_nach_mehreren_versuchen() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = connect_with_retry("test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("refused")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
