//! Arbeitswarteschlange zwischen TCP-Leser und Konvertierungs-Task (§4.6, §5)
//!
//! Anders als `iap::queue::ChunkQueue` ist diese Warteschlange unbegrenzt:
//! Subchunks treffen im Tempo der TTS-Generierung ein, deutlich langsamer
//! als die Konvertierung sie verarbeiten kann, und ein verworfener Subchunk
//! wuerde die Fast-Start-Erkennung (erstes hoerbares Fenster je Aeusserung)
//! durcheinanderbringen.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use telefonkern_protocol::Subchunk;

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Data(Subchunk),
    Bye,
}

pub struct WorkQueue {
    items: Mutex<VecDeque<Item>>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    pub fn push(&self, item: Item) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Entnimmt alle aktuell wartenden Eintraege auf einmal (§4.6: "All
    /// currently queued jobs are drained per tick", kein 1-Job-Limit).
    pub fn drain_all(&self) -> Vec<Item> {
        self.items.lock().drain(..).collect()
    }

    pub async fn warte_auf_eintrag(&self) {
        self.notify.notified().await;
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leerer_subchunk(id: u32) -> Subchunk {
        Subchunk {
            sample_rate: 24_000,
            chunk_id: id,
            samples: vec![0.1, 0.2],
        }
    }

    #[test]
    fn drain_all_liefert_alles_in_fifo_reihenfolge() {
        let q = WorkQueue::new();
        q.push(Item::Data(leerer_subchunk(1)));
        q.push(Item::Data(leerer_subchunk(2)));
        q.push(Item::Bye);
        let drained = q.drain_all();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], Item::Data(leerer_subchunk(1)));
        assert_eq!(drained[2], Item::Bye);
        assert!(q.is_empty());
    }
}
