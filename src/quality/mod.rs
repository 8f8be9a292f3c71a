//! Quality Module - Live-Bewertung der Anrufqualität
//!
//! Dieses Modul verwaltet:
//! - Abfrage der Transport-Statistiken (webrtc-rs oder eigene Quellen)
//! - Berechnung von Durchsatz und Paketverlust
//! - Quality Score 1–5
//! - Periodisches Monitoring mit Stop-Handle

mod monitor;
mod score;
mod stats;

pub use monitor::{start_monitoring, start_monitoring_with, MonitorHandle, Sampler};
pub use score::{score_quality, QualitySample, QualityScore};
pub use stats::{
    records_from_report, ReportKind, StatsError, StatsProvider, StatsRecord, StatsSnapshot,
};
