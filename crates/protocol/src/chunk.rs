//! Payload-Kodierung fuer Audio-Chunks (IAP → T) und Reply-Text (R → S, T → R)
//!
//! Beide nutzen das einfache `wire::Frame`-Payload direkt: ein Chunk ist
//! `length/4` float32-LE-Samples, Text ist roher UTF-8.

/// Kodiert 16 kHz float32-PCM-Samples als LE-Bytes fuer einen Payload-Frame.
pub fn encode_chunk(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Dekodiert einen Chunk-Payload zurueck in float32-Samples.
pub fn decode_chunk(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Kodiert einen Text-Delta als UTF-8-Bytes.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Dekodiert einen Text-Payload. Ungueltiges UTF-8 wird verlustfrei ersetzt.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trip() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let bytes = encode_chunk(&samples);
        assert_eq!(bytes.len(), samples.len() * 4);
        let back = decode_chunk(&bytes);
        assert_eq!(back, samples);
    }

    #[test]
    fn chunk_leeres_array() {
        assert!(encode_chunk(&[]).is_empty());
        assert!(decode_chunk(&[]).is_empty());
    }

    #[test]
    fn text_round_trip() {
        let text = "Hello, world!";
        let bytes = encode_text(text);
        assert_eq!(decode_text(&bytes), text);
    }
}
