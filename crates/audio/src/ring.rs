//! POSIX-Shared-Memory-Ring zwischen SE und IAP/OAP (§3, §6, §8)
//!
//! Ein Ring pro Richtung und Anruf: `/ap_in_<C>` (SE Produzent, IAP Konsument)
//! und `/ap_out_<C>` (OAP Produzent, SE Konsument). Fester Header gefolgt von
//! `slot_count` Slots aus `slot_size` Bytes, jeder Slot mit 4-Byte-LE-Laengen-
//! praefix. Single-Producer/Single-Consumer, Indizes per Acquire/Release auf
//! den rohen Header-Feldern – kein generischer Epoch-/Bitmask-Mechanismus
//! noetig, da es hier genau einen Schreiber und einen Leser pro Ring gibt.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use shared_memory::{Shmem, ShmemConf, ShmemError};

use crate::error::{AudioError, Result};

pub const MAGIC: u32 = 0x4150_4348;
pub const VERSION: u32 = 1;
pub const DEFAULT_SLOT_SIZE: u32 = 2048;
pub const DEFAULT_SLOT_COUNT: u32 = 512;

const FLAG_PRODUCER: u32 = 0b01;
const FLAG_CONSUMER: u32 = 0b10;

/// Peer-Herzschlag gilt nach dieser Dauer als veraltet (§4.1, §6).
pub const HEARTBEAT_STALE_NS: u64 = 5_000_000_000;

const RESERVED_BYTES: usize = 64;

#[repr(C)]
struct RingHeader {
    magic: AtomicU32,
    version: AtomicU32,
    call_id: AtomicU32,
    write_index: AtomicU32,
    read_index: AtomicU32,
    connected_flags: AtomicU32,
    producer_heartbeat_ns: AtomicU64,
    consumer_heartbeat_ns: AtomicU64,
    slot_size: AtomicU32,
    slot_count: AtomicU32,
    _reserved: [u8; RESERVED_BYTES],
}

const fn header_size() -> usize {
    std::mem::size_of::<RingHeader>()
}

fn ring_shm_size(slot_size: u32, slot_count: u32) -> usize {
    header_size() + (slot_size as usize) * (slot_count as usize)
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Welche Rolle dieser Prozess am Ring spielt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// Ein geoeffneter Audio-Ring. Bei `Drop` wird das eigene Flag geloescht,
/// das gemeinsame Segment bleibt bestehen (die Gegenseite kann noch lesen
/// oder spaeter reconnecten).
pub struct AudioRing {
    shm: Shmem,
    role: Role,
    slot_size: u32,
    slot_count: u32,
}

unsafe impl Send for AudioRing {}

impl AudioRing {
    /// Name fuer den eingehenden Ring (SE → IAP) einer Anruf-ID.
    pub fn eingehend_name(call_id: u32) -> String {
        format!("/ap_in_{call_id}")
    }

    /// Name fuer den ausgehenden Ring (OAP → SE) einer Anruf-ID.
    pub fn ausgehend_name(call_id: u32) -> String {
        format!("/ap_out_{call_id}")
    }

    /// Legt das Segment an (oder oeffnet es, falls bereits vorhanden) und
    /// initialisiert den Header bei Neuanlage mit Standardgeometrie.
    pub fn create_or_open(
        name: &str,
        call_id: u32,
        role: Role,
        slot_size: u32,
        slot_count: u32,
    ) -> Result<Self> {
        let size = ring_shm_size(slot_size, slot_count);
        let shm = match ShmemConf::new().size(size).flink(name).create() {
            Ok(shm) => {
                let ring = Self { shm, role, slot_size, slot_count };
                ring.header().magic.store(MAGIC, Ordering::Relaxed);
                ring.header().version.store(VERSION, Ordering::Relaxed);
                ring.header().call_id.store(call_id, Ordering::Relaxed);
                ring.header().write_index.store(0, Ordering::Relaxed);
                ring.header().read_index.store(0, Ordering::Relaxed);
                ring.header().connected_flags.store(0, Ordering::Relaxed);
                ring.header().slot_size.store(slot_size, Ordering::Relaxed);
                ring.header().slot_count.store(slot_count, Ordering::Relaxed);
                ring
            }
            Err(ShmemError::LinkExists) | Err(ShmemError::MappingIdExists) => {
                let shm = ShmemConf::new().flink(name).open()?;
                Self::open_existing(shm, role)?
            }
            Err(e) => return Err(e.into()),
        };
        shm.mark_connected(role);
        Ok(shm)
    }

    fn open_existing(shm: Shmem, role: Role) -> Result<Self> {
        let ring = Self {
            shm,
            role,
            slot_size: 0,
            slot_count: 0,
        };
        let magic = ring.header().magic.load(Ordering::Acquire);
        let version = ring.header().version.load(Ordering::Acquire);
        if magic != MAGIC {
            return Err(AudioError::RingHeaderMismatch {
                erwartet: MAGIC,
                gefunden: magic,
            });
        }
        if version != VERSION {
            return Err(AudioError::RingVersionMismatch {
                erwartet: VERSION,
                gefunden: version,
            });
        }
        let slot_size = ring.header().slot_size.load(Ordering::Acquire);
        let slot_count = ring.header().slot_count.load(Ordering::Acquire);
        Ok(Self {
            shm: ring.shm,
            role: ring.role,
            slot_size,
            slot_count,
        })
    }

    fn mark_connected(&self, role: Role) {
        let bit = match role {
            Role::Producer => FLAG_PRODUCER,
            Role::Consumer => FLAG_CONSUMER,
        };
        self.header().connected_flags.fetch_or(bit, Ordering::AcqRel);
    }

    fn header(&self) -> &RingHeader {
        unsafe { &*(self.shm.as_ptr() as *const RingHeader) }
    }

    fn slot_ptr(&self, idx: u32) -> *mut u8 {
        unsafe {
            self.shm
                .as_ptr()
                .add(header_size())
                .add(idx as usize * self.slot_size as usize)
        }
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn is_empty(&self) -> bool {
        let h = self.header();
        h.write_index.load(Ordering::Acquire) == h.read_index.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        let h = self.header();
        let next = (h.write_index.load(Ordering::Acquire) + 1) % self.slot_count;
        next == h.read_index.load(Ordering::Acquire)
    }

    /// Schreibt einen Frame. Gibt `Ok(false)` zurueck, wenn der Ring voll ist
    /// (Drop-Policy, §4.1) – kein Fehler, der Aufrufer zaehlt das selbst.
    pub fn write_frame(&self, payload: &[u8]) -> Result<bool> {
        if self.role != Role::Producer {
            return Err(AudioError::FalscheRolle);
        }
        if payload.len() + 4 > self.slot_size as usize {
            return Err(AudioError::PayloadZuGross {
                len: payload.len(),
                max: self.slot_size as usize - 4,
            });
        }
        if self.is_full() {
            return Ok(false);
        }
        let h = self.header();
        let idx = h.write_index.load(Ordering::Relaxed);
        unsafe {
            let ptr = self.slot_ptr(idx);
            ptr.copy_from_nonoverlapping((payload.len() as u32).to_le_bytes().as_ptr(), 4);
            std::ptr::copy_nonoverlapping(payload.as_ptr(), ptr.add(4), payload.len());
        }
        let next = (idx + 1) % self.slot_count;
        h.write_index.store(next, Ordering::Release);
        h.producer_heartbeat_ns.store(now_ns(), Ordering::Release);
        Ok(true)
    }

    /// Liest den naechsten Frame, falls vorhanden.
    pub fn read_frame(&self) -> Result<Option<Vec<u8>>> {
        if self.role != Role::Consumer {
            return Err(AudioError::FalscheRolle);
        }
        if self.is_empty() {
            return Ok(None);
        }
        let h = self.header();
        let idx = h.read_index.load(Ordering::Relaxed);
        let (len, data) = unsafe {
            let ptr = self.slot_ptr(idx);
            let mut len_bytes = [0u8; 4];
            std::ptr::copy_nonoverlapping(ptr, len_bytes.as_mut_ptr(), 4);
            let len = u32::from_le_bytes(len_bytes) as usize;
            let data = std::slice::from_raw_parts(ptr.add(4), len).to_vec();
            (len, data)
        };
        let _ = len;
        let next = (idx + 1) % self.slot_count;
        h.read_index.store(next, Ordering::Release);
        h.consumer_heartbeat_ns.store(now_ns(), Ordering::Release);
        Ok(Some(data))
    }

    /// Prueft, ob der Herzschlag der Gegenseite innerhalb des 5s-Fensters liegt.
    pub fn peer_is_alive(&self) -> bool {
        let h = self.header();
        let peer_ts = match self.role {
            Role::Producer => h.consumer_heartbeat_ns.load(Ordering::Acquire),
            Role::Consumer => h.producer_heartbeat_ns.load(Ordering::Acquire),
        };
        if peer_ts == 0 {
            return true;
        }
        now_ns().saturating_sub(peer_ts) < HEARTBEAT_STALE_NS
    }
}
