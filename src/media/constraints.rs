//! Constraint Planner
//!
//! Erstellt das Constraint-Profil für die Medienaufnahme abhängig vom
//! Anruftyp. Die Feldnamen folgen der Browser-API (`getUserMedia`), damit
//! ein Profil direkt als JSON an eine Web-Capture-Schicht gehen kann.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate für Sprachaufnahme
pub const CAPTURE_SAMPLE_RATE: u32 = 44100;

/// Channels (Mono für Voice)
pub const CAPTURE_CHANNELS: u16 = 1;

// ============================================================================
// CALL TYPE
// ============================================================================

/// Art des Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Nur Audio
    Audio,
    /// Audio + Video
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Audio => "audio",
            CallType::Video => "video",
        }
    }
}

/// Alles außer "video" ist ein Audio-Anruf
impl From<&str> for CallType {
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("video") {
            CallType::Video
        } else {
            CallType::Audio
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CONSTRAINT TYPES
// ============================================================================

/// Wertebereich mit Zielwert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstrainRange<T> {
    pub min: T,
    pub max: T,
    pub ideal: T,
}

impl<T: PartialOrd + Copy> ConstrainRange<T> {
    pub fn new(min: T, max: T, ideal: T) -> Self {
        Self { min, max, ideal }
    }

    /// Prüft ob ein Wert im Bereich liegt (Grenzen inklusive)
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Bevorzugte Kamera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Frontkamera
    User,
    /// Rückkamera
    Environment,
}

/// Audio-Constraints (feste Werte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: CAPTURE_SAMPLE_RATE,
            channel_count: CAPTURE_CHANNELS,
        }
    }
}

/// Video-Constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: ConstrainRange<u32>,
    pub height: ConstrainRange<u32>,
    pub frame_rate: ConstrainRange<u32>,
    pub facing_mode: FacingMode,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: ConstrainRange::new(320, 1280, 640),
            height: ConstrainRange::new(240, 720, 480),
            frame_rate: ConstrainRange::new(15, 30, 30),
            facing_mode: FacingMode::User,
        }
    }
}

/// Anforderung für eine Track-Art
///
/// Serialisiert wie in der Browser-API: `false`, `true` oder ein Objekt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackConstraints<T> {
    /// Track nicht anfordern
    #[default]
    Disabled,
    /// Track mit Geräte-Standardwerten anfordern
    Enabled,
    /// Track mit expliziten Constraints anfordern
    Constrained(T),
}

impl<T> TrackConstraints<T> {
    pub fn is_requested(&self) -> bool {
        !matches!(self, TrackConstraints::Disabled)
    }

    pub fn constraints(&self) -> Option<&T> {
        match self {
            TrackConstraints::Constrained(c) => Some(c),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for TrackConstraints<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TrackConstraints::Disabled => serializer.serialize_bool(false),
            TrackConstraints::Enabled => serializer.serialize_bool(true),
            TrackConstraints::Constrained(c) => c.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for TrackConstraints<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<U> {
            Flag(bool),
            Constraints(U),
        }

        Ok(match Repr::<T>::deserialize(deserializer)? {
            Repr::Flag(false) => TrackConstraints::Disabled,
            Repr::Flag(true) => TrackConstraints::Enabled,
            Repr::Constraints(c) => TrackConstraints::Constrained(c),
        })
    }
}

// ============================================================================
// PROFILES
// ============================================================================

/// Constraint-Profil für einen Anruf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintProfile {
    pub audio: AudioConstraints,
    pub video: TrackConstraints<VideoConstraints>,
}

/// Parameter für eine Capture-Anfrage (`getUserMedia`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStreamConstraints {
    pub audio: TrackConstraints<AudioConstraints>,
    pub video: TrackConstraints<VideoConstraints>,
}

impl MediaStreamConstraints {
    /// Minimale Anfrage für einen Berechtigungs-Check
    pub fn for_call(call_type: CallType) -> Self {
        Self {
            audio: TrackConstraints::Enabled,
            video: match call_type {
                CallType::Video => TrackConstraints::Enabled,
                CallType::Audio => TrackConstraints::Disabled,
            },
        }
    }
}

/// `{ audio: true, video: false }`
impl Default for MediaStreamConstraints {
    fn default() -> Self {
        Self::for_call(CallType::Audio)
    }
}

impl From<ConstraintProfile> for MediaStreamConstraints {
    fn from(profile: ConstraintProfile) -> Self {
        Self {
            audio: TrackConstraints::Constrained(profile.audio),
            video: profile.video,
        }
    }
}

/// Erstellt das Constraint-Profil für einen Anruftyp
pub fn plan_constraints(call_type: CallType) -> ConstraintProfile {
    let video = match call_type {
        CallType::Video => TrackConstraints::Constrained(VideoConstraints::default()),
        CallType::Audio => TrackConstraints::Disabled,
    };

    ConstraintProfile {
        audio: AudioConstraints::default(),
        video,
    }
}

// ============================================================================
// TESTS
// ============================================================================
