//! Media Module - Bootstrap der Medienaufnahme
//!
//! Dieses Modul verwaltet:
//! - Capability Check (Peer Connections + Capture-API)
//! - Transiente Berechtigungsanfrage für Mikrofon/Kamera
//! - Constraint-Profile je Anruftyp
//! - Native Audio-Geräte über cpal

mod capabilities;
mod constraints;
mod cpal_devices;
mod devices;
mod permissions;

pub use capabilities::{
    check_support, default_ice_servers, CapabilityError, HostEnvironment, MediaEnvironment,
    MissingCapability, NativeEnvironment,
};
pub use constraints::{
    plan_constraints, AudioConstraints, CallType, ConstrainRange, ConstraintProfile, FacingMode,
    MediaStreamConstraints, TrackConstraints, VideoConstraints, CAPTURE_CHANNELS,
    CAPTURE_SAMPLE_RATE,
};
pub use cpal_devices::CpalDevices;
pub use devices::{MediaDevices, MediaError, MediaStream, MediaStreamTrack, TrackKind};
pub use permissions::request_permissions;

#[cfg(test)]
pub(crate) use permissions::tests::FakeDevices;
