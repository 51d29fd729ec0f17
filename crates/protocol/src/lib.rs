//! telefonkern-protocol – Wire-Framing, Registrierung und Steuerkanal
//!
//! Alle Nachrichtenformate, die zwischen den sechs Pipeline-Komponenten
//! ausgetauscht werden: das rohe laengen-praefigierte TCP-Framing
//! (HELLO/Payload/BYE), die darauf aufbauenden Chunk-/Text-/Subchunk-
//! Payloads, die UDP-Registrierung, die TCP-Connect-Retry-Policy, die
//! Port-Disziplin und der UNIX-Steuerkanal.

pub mod chunk;
pub mod control;
pub mod ports;
pub mod registration;
pub mod retry;
pub mod subchunk;
pub mod wire;

pub use control::ControlCommand;
pub use ports::PortPlan;
pub use registration::RegistrationMessage;
pub use subchunk::{Subchunk, SubchunkFrame};
pub use wire::Frame;
