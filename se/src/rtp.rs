//! Minimales RTP-Framing fuer G.711 µ-law, PT 0 (§6)
//!
//! SE ist der einzige Ort, an dem ein RTP-Header angefasst wird. Sequenz
//! und Timestamp schreiten unabhaengig vom Rueckgrat des Rings monoton
//! fort, damit Empfaenger nie eine Luecke sehen (§4.1).

pub const HEADER_LEN: usize = 12;
pub const PAYLOAD_LEN: usize = 160;
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// 160 Bytes reines µ-law-Stille (`0xFF` ist die µ-law-Kodierung von 0).
pub const SILENCE_FRAME: [u8; PAYLOAD_LEN] = [0xFFu8; PAYLOAD_LEN];

pub fn is_silence(payload: &[u8]) -> bool {
    payload.iter().all(|&b| b == 0xFF)
}

/// Packt einen RTP-Header + 160-Byte-Payload. `ssrc` bleibt je Anruf fest.
pub fn pack(seq: u16, timestamp: u32, ssrc: u32, payload: &[u8; PAYLOAD_LEN]) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0] = 0x80; // Version 2, keine Padding/Extension/CSRC
    out[1] = 0x00; // Marker 0, Payload-Type 0 (G.711 µ-law)
    out[2..4].copy_from_slice(&seq.to_be_bytes());
    out[4..8].copy_from_slice(&timestamp.to_be_bytes());
    out[8..12].copy_from_slice(&ssrc.to_be_bytes());
    out[12..].copy_from_slice(payload);
    out
}

/// Entpackt ein empfangenes RTP-Paket; gibt `None` zurueck wenn die
/// Paketgroesse nicht zum erwarteten 20ms/160-Byte-Frame passt.
pub fn unpack(packet: &[u8]) -> Option<[u8; PAYLOAD_LEN]> {
    if packet.len() != FRAME_LEN {
        return None;
    }
    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&packet[HEADER_LEN..]);
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = 0x12;
        payload[159] = 0x34;
        let packet = pack(7, 1120, 0xdead_beef, &payload);
        assert_eq!(packet.len(), FRAME_LEN);
        assert_eq!(unpack(&packet).unwrap(), payload);
    }

    #[test]
    fn silence_erkannt() {
        assert!(is_silence(&SILENCE_FRAME));
        let mut nicht_still = SILENCE_FRAME;
        nicht_still[0] = 0x01;
        assert!(!is_silence(&nicht_still));
    }

    #[test]
    fn falsche_groesse_liefert_none() {
        assert_eq!(unpack(&[0u8; 5]), None);
    }
}
