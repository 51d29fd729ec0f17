//! Audio-Subchunk-Framing (S → OAP)
//!
//! `u32_be length, u32_be sample_rate, u32_be chunk_id, length Bytes float32 PCM`.
//! `length == 0` ist der Ende-der-Aeusserung-Marker (Rate/ID bleiben erhalten
//! damit OAP weiss, zu welcher laufenden Aeusserung er gehoert). Die
//! aeussere BYE-Markierung (`length == 0xFFFFFFFF`, kein Body) ist davon
//! unabhaengig und beendet die TCP-Verbindung wie bei den anderen Kanaelen.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::BYE_LEN;

/// Ein einzelner Audio-Subchunk oder der Ende-Marker dazu.
#[derive(Debug, Clone, PartialEq)]
pub struct Subchunk {
    pub sample_rate: u32,
    pub chunk_id: u32,
    /// Leer = Ende-der-Aeusserung-Marker
    pub samples: Vec<f32>,
}

impl Subchunk {
    pub fn is_end_of_utterance(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Ergebnis des Lesens eines Subchunk-Frames.
#[derive(Debug, Clone, PartialEq)]
pub enum SubchunkFrame {
    Data(Subchunk),
    Bye,
}

pub async fn write_subchunk<W: AsyncWrite + Unpin>(
    writer: &mut W,
    subchunk: &Subchunk,
) -> io::Result<()> {
    let payload_len = (subchunk.samples.len() * 4) as u32;
    writer.write_all(&payload_len.to_be_bytes()).await?;
    writer.write_all(&subchunk.sample_rate.to_be_bytes()).await?;
    writer.write_all(&subchunk.chunk_id.to_be_bytes()).await?;
    for s in &subchunk.samples {
        writer.write_all(&s.to_le_bytes()).await?;
    }
    writer.flush().await
}

pub async fn write_subchunk_bye<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&BYE_LEN.to_be_bytes()).await?;
    writer.flush().await
}

pub async fn read_subchunk<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<SubchunkFrame> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let payload_len = u32::from_be_bytes(len_buf);

    if payload_len == BYE_LEN {
        return Ok(SubchunkFrame::Bye);
    }

    let mut rate_buf = [0u8; 4];
    reader.read_exact(&mut rate_buf).await?;
    let sample_rate = u32::from_be_bytes(rate_buf);

    let mut id_buf = [0u8; 4];
    reader.read_exact(&mut id_buf).await?;
    let chunk_id = u32::from_be_bytes(id_buf);

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;
    let samples = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(SubchunkFrame::Data(Subchunk {
        sample_rate,
        chunk_id,
        samples,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subchunk_round_trip() {
        let sc = Subchunk {
            sample_rate: 24000,
            chunk_id: 3,
            samples: vec![0.1, 0.2, -0.3],
        };
        let mut buf = Vec::new();
        write_subchunk(&mut buf, &sc).await.unwrap();
        let mut cursor = io::Cursor::new(buf);
        let frame = read_subchunk(&mut cursor).await.unwrap();
        assert_eq!(frame, SubchunkFrame::Data(sc));
    }

    #[tokio::test]
    async fn end_of_utterance_marker() {
        let sc = Subchunk {
            sample_rate: 24000,
            chunk_id: 7,
            samples: vec![],
        };
        assert!(sc.is_end_of_utterance());
        let mut buf = Vec::new();
        write_subchunk(&mut buf, &sc).await.unwrap();
        let mut cursor = io::Cursor::new(buf);
        match read_subchunk(&mut cursor).await.unwrap() {
            SubchunkFrame::Data(d) => assert!(d.is_end_of_utterance()),
            SubchunkFrame::Bye => panic!("erwartet Data, nicht Bye"),
        }
    }

    #[tokio::test]
    async fn bye_unterscheidet_sich_von_leerem_subchunk() {
        let mut buf = Vec::new();
        write_subchunk_bye(&mut buf).await.unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_subchunk(&mut cursor).await.unwrap(), SubchunkFrame::Bye);
    }
}
