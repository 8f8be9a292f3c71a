//! Pulse Media - Medien-Bootstrap und Qualitätsüberwachung für Anrufe
//!
//! Bevor ein Anruf aufgebaut wird:
//! - Prüfung ob Peer Connections und Medienaufnahme verfügbar sind
//! - Kurze Berechtigungsanfrage für Mikrofon/Kamera
//! - Constraint-Profil je nach Anruftyp (Audio oder Video)
//!
//! Während des Anrufs:
//! - Periodische Auswertung der WebRTC-Statistiken
//! - Durchsatz, Paketverlust und Note von 1 bis 5

pub mod call_engine;
pub mod config;
pub mod error;
pub mod media;
pub mod quality;

pub use call_engine::{CallEngine, CallEvent, CallState};
pub use config::MonitorConfig;
pub use error::{CallError, TransportKind};
pub use media::{
    check_support, plan_constraints, request_permissions, CallType, ConstraintProfile,
    MediaStreamConstraints, NativeEnvironment,
};
pub use quality::{score_quality, start_monitoring, MonitorHandle, QualitySample, QualityScore};

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging
///
/// `RUST_LOG` hat Vorrang vor den Standard-Direktiven. Ein bereits gesetzter
/// globaler Subscriber wird nicht ersetzt.
pub fn init_logging() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["pulse_media=debug", "webrtc=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Logging already initialized");
    }
}
