//! Call Engine Module - Ablauf eines Anrufs
//!
//! Dieses Modul verwaltet:
//! - Vorbereitung (Capabilities, Berechtigungen, Constraints)
//! - Quality Monitoring der aktiven Verbindung
//! - Call-Status und Events

mod engine;

pub use engine::{CallEngine, CallEvent, CallState};
