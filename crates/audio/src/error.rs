//! Fehlertypen fuer die Audio-Pfade: SHM-Ring, G.711, Resampling, VAD

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Ring-Header-Magic unerwartet: erwartet {erwartet:#x}, gefunden {gefunden:#x}")]
    RingHeaderMismatch { erwartet: u32, gefunden: u32 },

    #[error("Ring-Version unerwartet: erwartet {erwartet}, gefunden {gefunden}")]
    RingVersionMismatch { erwartet: u32, gefunden: u32 },

    #[error("Falsche Rolle fuer diese Operation am Ring")]
    FalscheRolle,

    #[error("Payload zu gross fuer Slot: {len} Bytes, maximal {max}")]
    PayloadZuGross { len: usize, max: usize },

    #[error("Ring-Buffer voll")]
    RingBufferVoll,

    #[error("Ring-Buffer leer")]
    RingBufferLeer,

    #[error("Peer-Herzschlag ueberfaellig seit {seit_ms} ms")]
    PeerHerzschlagVeraltet { seit_ms: u64 },

    #[error("Ungueltige Sample-Rate fuer Resampling: {0} Hz")]
    UngueltigeAbtastrate(u32),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Shared-Memory-Fehler: {0}")]
    Shm(#[from] shared_memory::ShmemError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;
