//! `out_buffer`: 160-Byte-µ-law-Frame-Puffer zwischen Konvertierung und
//! Ring-Publisher, mit der Ueberlauf-Politik aus §4.6.
//!
//! Bei Ueberlauf wird, solange der Ring-Publisher noch nichts sendet, bis
//! zu `ueberlauf_gnadenfrist` gewartet, bevor der aelteste Frame verworfen
//! wird; sobald der Scheduler aktiv sendet, geschieht das Verwerfen sofort
//! (ein weiterer Frame haette ohnehin keine Chance, rechtzeitig zu spielen).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct OutBuffer {
    frames: VecDeque<[u8; 160]>,
    max_frames: usize,
    gnadenfrist: Duration,
    ueberlauf_seit: Option<Instant>,
    scheduler_sendet_aktiv: bool,
}

impl OutBuffer {
    pub fn new(max_frames: usize, gnadenfrist: Duration) -> Self {
        Self {
            frames: VecDeque::new(),
            max_frames,
            gnadenfrist,
            ueberlauf_seit: None,
            scheduler_sendet_aktiv: false,
        }
    }

    /// Haengt einen Frame an; gibt `true` zurueck, wenn dabei der aelteste
    /// Frame verworfen wurde.
    pub fn push(&mut self, frame: [u8; 160]) -> bool {
        self.frames.push_back(frame);
        if self.frames.len() <= self.max_frames {
            self.ueberlauf_seit = None;
            return false;
        }

        if self.scheduler_sendet_aktiv {
            self.frames.pop_front();
            return true;
        }

        let seit = *self.ueberlauf_seit.get_or_insert_with(Instant::now);
        if seit.elapsed() >= self.gnadenfrist {
            self.frames.pop_front();
            self.ueberlauf_seit = None;
            return true;
        }
        false
    }

    pub fn pop(&mut self) -> Option<[u8; 160]> {
        self.frames.pop_front()
    }

    /// Der Ring-Publisher ruft dies nach dem ersten tatsaechlich gesendeten
    /// Frame auf; ab dann gilt die sofortige statt die gnadenfrist-basierte
    /// Drop-Regel.
    pub fn markiere_scheduler_aktiv(&mut self) {
        self.scheduler_sendet_aktiv = true;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fuellwert: u8) -> [u8; 160] {
        [fuellwert; 160]
    }

    #[test]
    fn unter_kapazitaet_verwirft_nichts() {
        let mut buf = OutBuffer::new(2, Duration::from_millis(1000));
        assert!(!buf.push(frame(1)));
        assert!(!buf.push(frame(2)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn ueberlauf_verwirft_sofort_wenn_scheduler_aktiv() {
        let mut buf = OutBuffer::new(1, Duration::from_millis(1000));
        buf.markiere_scheduler_aktiv();
        assert!(!buf.push(frame(1)));
        assert!(buf.push(frame(2)));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.pop(), Some(frame(2)));
    }

    #[test]
    fn ueberlauf_wartet_gnadenfrist_wenn_scheduler_untaetig() {
        let mut buf = OutBuffer::new(1, Duration::from_millis(50));
        assert!(!buf.push(frame(1)));
        assert!(!buf.push(frame(2)));
        assert_eq!(buf.len(), 2);
        std::thread::sleep(Duration::from_millis(60));
        assert!(buf.push(frame(3)));
        assert_eq!(buf.len(), 2);
    }
}
