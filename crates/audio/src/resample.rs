//! Lineare Resampling-Hilfe zwischen 8/16/24 kHz (§3, §4.2, §4.6)
//!
//! Keine Bandbegrenzung, keine Polyphasenfilter – nur lineare Interpolation,
//! wie es fuer schmale Sprachbandbreiten und die erlaubte Qualitaetsstufe
//! dieser Pipeline ausreicht.

use crate::error::{AudioError, Result};

/// Resampled `samples` von `from_hz` auf `to_hz` per linearer Interpolation.
pub fn resample_linear(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>> {
    if from_hz == 0 || to_hz == 0 {
        return Err(AudioError::UngueltigeAbtastrate(if from_hz == 0 { from_hz } else { to_hz }));
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if from_hz == to_hz {
        return Ok(samples.to_vec());
    }

    let ratio = to_hz as f64 / from_hz as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx0 = src_pos.floor() as usize;
        let frac = src_pos - idx0 as f64;
        let s0 = samples[idx0.min(samples.len() - 1)];
        let s1 = samples[(idx0 + 1).min(samples.len() - 1)];
        out.push(s0 + (s1 - s0) * frac as f32);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gleiche_rate_ist_identitaet() {
        let samples = vec![0.1, 0.2, 0.3];
        let out = resample_linear(&samples, 8000, 8000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn upsampling_verdoppelt_laenge() {
        let samples = vec![0.0, 1.0, 0.0, -1.0];
        let out = resample_linear(&samples, 8000, 16000).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn downsampling_halbiert_laenge() {
        let samples: Vec<f32> = (0..320).map(|i| i as f32).collect();
        let out = resample_linear(&samples, 16000, 8000).unwrap();
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn hin_und_rueck_bleibt_naeherungsweise_erhalten() {
        let samples: Vec<f32> = (0..160)
            .map(|i| (i as f32 * 0.1).sin())
            .collect();
        let up = resample_linear(&samples, 8000, 24000).unwrap();
        let back = resample_linear(&up, 24000, 8000).unwrap();
        assert_eq!(back.len(), samples.len());
        let max_diff = samples
            .iter()
            .zip(back.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 0.05, "max_diff={max_diff}");
    }

    #[test]
    fn null_hertz_ist_ein_fehler() {
        assert!(resample_linear(&[0.0, 1.0], 0, 8000).is_err());
        assert!(resample_linear(&[0.0, 1.0], 8000, 0).is_err());
    }

    #[test]
    fn leere_eingabe_liefert_leere_ausgabe() {
        assert_eq!(resample_linear(&[], 8000, 16000).unwrap(), Vec::<f32>::new());
    }
}
