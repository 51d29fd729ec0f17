//! Begrenzte Chunk-Warteschlange zwischen VAD-Thread und TCP-Schreiber (§4.2)
//!
//! Der VAD-Thread darf nie auf einen langsamen oder fehlenden T-Client
//! warten; bei Ueberlauf wird der aelteste Chunk verworfen statt den
//! Schreiber zu blockieren.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Ein Element der Warteschlange: entweder ein VAD-Chunk oder die
/// Ankuendigung, dass nach diesem Punkt BYE gesendet werden soll. `Bye`
/// selbst nimmt nie am Drop-aeltester-Policy teil (siehe `push`).
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Chunk(Vec<f32>),
    Bye,
}

pub struct ChunkQueue {
    items: Mutex<VecDeque<Item>>,
    kapazitaet: usize,
    notify: Notify,
}

impl ChunkQueue {
    pub fn new(kapazitaet: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            kapazitaet,
            notify: Notify::new(),
        })
    }

    /// Haengt einen Chunk an; gibt `true` zurueck wenn dabei der aelteste
    /// Chunk verworfen werden musste (§4.2 Drop-Policy, Kapazitaet default 16).
    pub fn push_chunk(&self, chunk: Vec<f32>) -> bool {
        let mut items = self.items.lock();
        let mut dropped = false;
        if items.len() >= self.kapazitaet {
            items.pop_front();
            dropped = true;
        }
        items.push_back(Item::Chunk(chunk));
        drop(items);
        self.notify.notify_one();
        dropped
    }

    /// Haengt die BYE-Ankuendigung an; nicht von der Kapazitaetsgrenze betroffen.
    pub fn push_bye(&self) {
        self.items.lock().push_back(Item::Bye);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<Item> {
        self.items.lock().pop_front()
    }

    pub async fn warte_auf_eintrag(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
