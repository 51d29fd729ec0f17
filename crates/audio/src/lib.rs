//! telefonkern-audio – Shared-Memory-Ring, G.711-Codec, Resampler und VAD
//!
//! Die Audio-Bausteine, die IAP und OAP fuer einen Anruf brauchen:
//! - POSIX-Shared-Memory-Ring zwischen SE und IAP/OAP
//! - G.711 µ-law Kodierung/Dekodierung
//! - Lineares Resampling zwischen 8/16/24 kHz
//! - Energiebasierte VAD mit Hysterese und variabler Chunk-Laenge

pub mod error;
pub mod mulaw;
pub mod resample;
pub mod ring;
pub mod vad;

pub use error::{AudioError, Result};
pub use mulaw::{decode as mulaw_decode, encode as mulaw_encode};
pub use resample::resample_linear;
pub use ring::{AudioRing, Role as RingRole};
pub use vad::{Vad, VadConfig};
