//! Rohes Laengen-praefigiertes Wire-Format fuer die per-Call TCP-Kanaele
//!
//! Einheitlich ueber IAP→T, T→R, R→S und S→OAP: jede Verbindung beginnt
//! mit einem HELLO-Frame, danach folgen beliebig viele Payload-Frames,
//! und die Verbindung wird mit einem BYE-Frame (Laenge `0xFFFFFFFF`,
//! kein Body) sauber beendet. Im Gegensatz zu einem JSON-Envelope ist
//! der Payload hier rohbinaer – welcher konkrete Inhalt das ist
//! (float32 PCM, UTF-8-Text, Audio-Subchunk) entscheidet die jeweilige
//! Komponente, siehe `chunk`, `text` und `subchunk`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use telefonkern_core::types::CallId;

/// Laengenwert der ein BYE markiert statt eines echten Payloads
pub const BYE_LEN: u32 = 0xFFFFFFFF;

/// Standard-Obergrenze fuer einen einzelnen Frame-Payload (4 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Ergebnis des Lesens eines rohen Frames
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Payload(Vec<u8>),
    Bye,
}

/// Schreibt das HELLO-Frame: `u32_be length, ASCII-Dezimal der Call-ID`.
pub async fn write_hello<W: AsyncWrite + Unpin>(writer: &mut W, call_id: CallId) -> io::Result<()> {
    let ascii = call_id.to_string();
    let bytes = ascii.as_bytes();
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Liest das HELLO-Frame und parst die enthaltene Call-ID.
pub async fn read_hello<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<CallId> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    let text = String::from_utf8(buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("HELLO nicht UTF-8: {e}")))?;
    text.parse::<CallId>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("HELLO keine gueltige Call-ID: {e}")))
}

/// Schreibt den BYE-Frame (`length = 0xFFFFFFFF`, kein Body).
pub async fn write_bye<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&BYE_LEN.to_be_bytes()).await?;
    writer.flush().await
}

/// Schreibt einen Payload-Frame: `u32_be length, payload`.
pub async fn write_payload<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Liest den naechsten Frame: entweder einen Payload oder BYE.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len == BYE_LEN {
        return Ok(Frame::Bye);
    }

    let len = len as usize;
    if len > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame zu gross: {len} Bytes (Maximum {max_frame_size})"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Frame::Payload(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hello_round_trip() {
        let mut buf: Vec<u8> = Vec::new();
        write_hello(&mut buf, CallId(42)).await.unwrap();
        let mut cursor = io::Cursor::new(buf);
        let id = read_hello(&mut cursor).await.unwrap();
        assert_eq!(id, CallId(42));
    }

    #[tokio::test]
    async fn payload_round_trip() {
        let mut buf: Vec<u8> = Vec::new();
        write_payload(&mut buf, b"hallo welt").await.unwrap();
        let mut cursor = io::Cursor::new(buf);
        let frame = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame, Frame::Payload(b"hallo welt".to_vec()));
    }

    #[tokio::test]
    async fn bye_frame_hat_keinen_body() {
        let mut buf: Vec<u8> = Vec::new();
        write_bye(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 4);
        let mut cursor = io::Cursor::new(buf);
        let frame = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame, Frame::Bye);
    }

    #[tokio::test]
    async fn leerer_payload_ist_kein_bye() {
        let mut buf: Vec<u8> = Vec::new();
        write_payload(&mut buf, &[]).await.unwrap();
        let mut cursor = io::Cursor::new(buf);
        let frame = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame, Frame::Payload(vec![]));
    }

    #[tokio::test]
    async fn zu_grosser_frame_wird_abgelehnt() {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&200u32.to_be_bytes());
        buf.extend_from_slice(&vec![0u8; 10]); // weniger Bytes als behauptet
        let mut cursor = io::Cursor::new(buf);
        let result = read_frame(&mut cursor, 100).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mehrere_frames_nacheinander() {
        let mut buf: Vec<u8> = Vec::new();
        write_payload(&mut buf, b"eins").await.unwrap();
        write_payload(&mut buf, b"zwei").await.unwrap();
        write_bye(&mut buf).await.unwrap();

        let mut cursor = io::Cursor::new(buf);
        assert_eq!(
            read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap(),
            Frame::Payload(b"eins".to_vec())
        );
        assert_eq!(
            read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap(),
            Frame::Payload(b"zwei".to_vec())
        );
        assert_eq!(
            read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap(),
            Frame::Bye
        );
    }
}
