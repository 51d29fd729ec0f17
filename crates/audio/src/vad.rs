//! Energiebasierte Sprachaktivitaetserkennung mit Hysterese (§4.2, §8)
//!
//! Arbeitet auf 20-ms-Analysefenstern bei 16 kHz (320 Samples). Zustaende
//! `Idle`/`Recording`; Pre-Roll wird aus einem Ring vorangegangener Fenster
//! waehrend `Idle` gespeist, Overlap wird beim Chunk-Abschluss in den naechsten
//! Pre-Roll uebernommen.

use std::collections::VecDeque;

pub const WINDOW_SAMPLES: usize = 320;
pub const SAMPLE_RATE_HZ: u32 = 16_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    pub threshold: f32,
    pub start_threshold: f32,
    pub stop_threshold: f32,
    pub hangover_ms: u32,
    pub pre_roll_ms: u32,
    pub overlap_ms: u32,
    pub min_chunk_ms: u32,
    pub max_chunk_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        let threshold = 0.02;
        Self {
            threshold,
            start_threshold: 1.5 * threshold,
            stop_threshold: 0.5 * threshold,
            hangover_ms: 400,
            pre_roll_ms: 350,
            overlap_ms: 225,
            min_chunk_ms: 500,
            max_chunk_ms: 1000,
        }
    }
}

impl VadConfig {
    fn window_ms(&self) -> u32 {
        (WINDOW_SAMPLES as u32 * 1000) / SAMPLE_RATE_HZ
    }

    fn pre_roll_windows(&self) -> usize {
        (self.pre_roll_ms / self.window_ms().max(1)) as usize
    }

    fn hangover_windows(&self) -> u32 {
        self.hangover_ms / self.window_ms().max(1)
    }

    fn overlap_windows(&self) -> usize {
        (self.overlap_ms / self.window_ms().max(1)) as usize
    }

    fn min_chunk_windows(&self) -> usize {
        (self.min_chunk_ms / self.window_ms().max(1)) as usize
    }

    fn max_chunk_windows(&self) -> usize {
        (self.max_chunk_ms / self.window_ms().max(1)) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording,
}

/// Streaming-VAD: bekommt 20-ms-Fenster nacheinander, liefert bei Chunk-Ende
/// das aufgezeichnete Material zurueck.
pub struct Vad {
    config: VadConfig,
    state: State,
    pre_roll: VecDeque<Vec<f32>>,
    consecutive_speech: u32,
    consec_silence: u32,
    carry: Vec<Vec<f32>>,
    current: Vec<Vec<f32>>,
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            pre_roll: VecDeque::new(),
            consecutive_speech: 0,
            consec_silence: 0,
            carry: Vec::new(),
            current: Vec::new(),
        }
    }

    fn rms(window: &[f32]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = window.iter().map(|s| s * s).sum();
        (sum_sq / window.len() as f32).sqrt()
    }

    /// Verarbeitet ein einzelnes 20-ms-Fenster. Gibt `Some(chunk)` zurueck,
    /// wenn dieses Fenster den Abschluss eines Chunks ausgeloest hat.
    pub fn push_window(&mut self, window: &[f32]) -> Option<Vec<f32>> {
        let energy = Self::rms(window);

        match self.state {
            State::Idle => {
                if energy >= self.config.start_threshold {
                    self.consecutive_speech += 1;
                } else {
                    self.consecutive_speech = 0;
                }

                if self.consecutive_speech >= 2 {
                    self.state = State::Recording;
                    self.consec_silence = 0;
                    self.current = self.carry.drain(..).collect();
                    self.current.extend(self.pre_roll.drain(..));
                    self.current.push(window.to_vec());
                    self.pre_roll.clear();
                    self.consecutive_speech = 0;
                } else {
                    self.pre_roll.push_back(window.to_vec());
                    while self.pre_roll.len() > self.config.pre_roll_windows() {
                        self.pre_roll.pop_front();
                    }
                }
                None
            }
            State::Recording => {
                self.current.push(window.to_vec());

                if energy < self.config.stop_threshold {
                    self.consec_silence += 1;
                } else {
                    self.consec_silence = 0;
                }

                let chunk_windows = self.current.len();
                let reached_hangover = self.consec_silence >= self.config.hangover_windows();
                let reached_min = chunk_windows >= self.config.min_chunk_windows();
                let reached_max = chunk_windows >= self.config.max_chunk_windows();

                if reached_hangover && reached_min {
                    let chunk = self.finish_chunk();
                    self.state = State::Idle;
                    self.consecutive_speech = 0;
                    Some(chunk)
                } else if reached_max {
                    let chunk = self.finish_chunk();
                    self.current = self.carry.drain(..).collect();
                    Some(chunk)
                } else {
                    None
                }
            }
        }
    }

    fn finish_chunk(&mut self) -> Vec<f32> {
        let overlap_windows = self.config.overlap_windows().min(self.current.len());
        let split_at = self.current.len() - overlap_windows;
        self.carry = self.current[split_at..].to_vec();
        self.current
            .drain(..)
            .flat_map(|w| w.into_iter())
            .collect()
    }

    /// Erzwingt den Abschluss eines laufenden Chunks (z. B. bei BYE), sofern
    /// die Mindestdauer erreicht ist.
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.state != State::Recording {
            return None;
        }
        if self.current.len() < self.config.min_chunk_windows() {
            return None;
        }
        self.state = State::Idle;
        Some(self.finish_chunk())
    }

    pub fn is_recording(&self) -> bool {
        self.state == State::Recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence_window() -> Vec<f32> {
        vec![0.0; WINDOW_SAMPLES]
    }

    fn speech_window(amplitude: f32) -> Vec<f32> {
        (0..WINDOW_SAMPLES)
            .map(|i| amplitude * if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect()
    }

    /// Konstantes Fenster, das per `marker` identifizierbar bleibt, damit
    /// Chunk-Grenzen auf exakten Inhalt statt nur auf Laenge geprueft werden
    /// koennen. `marker` liegt ueber `start_threshold`, zaehlt also als Rede.
    fn marked_speech_window(marker: f32) -> Vec<f32> {
        vec![0.05 + marker; WINDOW_SAMPLES]
    }

    #[test]
    fn stille_emittiert_keinen_chunk() {
        let mut vad = Vad::new(VadConfig::default());
        let mut emitted = 0;
        for _ in 0..(60_000 / 20) {
            if vad.push_window(&silence_window()).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 0);
    }

    #[test]
    fn eine_kurze_aeusserung_ergibt_genau_einen_chunk() {
        let config = VadConfig::default();
        let mut vad = Vad::new(config);
        let mut chunks = Vec::new();

        for _ in 0..10 {
            if let Some(c) = vad.push_window(&silence_window()) {
                chunks.push(c);
            }
        }
        for _ in 0..20 {
            if let Some(c) = vad.push_window(&speech_window(0.5)) {
                chunks.push(c);
            }
        }
        for _ in 0..40 {
            if let Some(c) = vad.push_window(&silence_window()) {
                chunks.push(c);
            }
        }

        assert_eq!(chunks.len(), 1);
        let samples = chunks[0].len();
        let duration_ms = (samples as u32 * 1000) / SAMPLE_RATE_HZ;
        assert!(duration_ms >= 400 + config.pre_roll_ms);
        assert!(duration_ms <= 400 + config.pre_roll_ms + config.hangover_ms + 200);
    }

    #[test]
    fn dauerhafte_sprache_wird_in_max_chunk_stuecke_zerlegt() {
        let mut vad = Vad::new(VadConfig::default());
        let mut chunk_count = 0;
        let total_windows = (5000 / 20) + 4;
        for i in 0..total_windows {
            let window = if i < 2 { silence_window() } else { speech_window(0.5) };
            if vad.push_window(&window).is_some() {
                chunk_count += 1;
            }
        }
        assert!(chunk_count >= 4);
    }

    #[test]
    fn max_chunk_split_behaelt_overlap_fuer_naechsten_chunk() {
        let config = VadConfig::default();
        let mut vad = Vad::new(config);
        let mut chunks = Vec::new();

        let total_windows = (5000 / 20) + 4;
        for i in 0..total_windows {
            let window = if i < 2 {
                silence_window()
            } else {
                marked_speech_window(i as f32 * 0.0001)
            };
            if let Some(c) = vad.push_window(&window) {
                chunks.push(c);
            }
        }

        assert!(chunks.len() >= 2, "Test braucht mindestens zwei Max-Chunk-Splits");

        let overlap_windows = config.overlap_windows();
        let overlap_samples = overlap_windows * WINDOW_SAMPLES;

        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let prev_tail = &prev[prev.len() - overlap_samples..];
            let next_head = &next[..overlap_samples];
            assert_eq!(
                prev_tail, next_head,
                "der naechste Chunk muss mit dem Overlap des vorigen beginnen"
            );
        }
    }

    #[test]
    fn flush_ohne_aufnahme_liefert_nichts() {
        let mut vad = Vad::new(VadConfig::default());
        assert_eq!(vad.flush(), None);
    }

    #[test]
    fn flush_unterhalb_mindestdauer_liefert_nichts() {
        let mut vad = Vad::new(VadConfig::default());
        for _ in 0..3 {
            vad.push_window(&speech_window(0.5));
        }
        assert!(vad.is_recording());
        assert_eq!(vad.flush(), None);
    }
}
