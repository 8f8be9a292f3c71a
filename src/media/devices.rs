//! Capture-API Abstraktion
//!
//! `MediaDevices` entspricht dem `getUserMedia`-Aufruf einer Plattform,
//! `MediaStream` den zurückgegebenen Tracks. Tracks müssen stoppbar sein,
//! damit der Permission-Check das Gerät sofort wieder freigeben kann.

use super::constraints::MediaStreamConstraints;
use futures::future::BoxFuture;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No matching capture device: {0}")]
    DeviceNotFound(String),

    #[error("Capture failed: {0}")]
    Other(String),
}

// ============================================================================
// TRACKS
// ============================================================================

/// Art eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ein aufnehmender Track
pub trait MediaStreamTrack: Send {
    fn kind(&self) -> TrackKind;

    /// Beendet die Aufnahme. Mehrfacher Aufruf ist erlaubt.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Ergebnis einer Capture-Anfrage
pub struct MediaStream {
    tracks: Vec<Box<dyn MediaStreamTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaStreamTrack>>) -> Self {
        Self { tracks }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Stoppt alle Tracks
    pub fn stop_all(&mut self) {
        for track in self.tracks.iter_mut() {
            if track.is_live() {
                tracing::debug!("Stopping {:?} track", track.kind());
                track.stop();
            }
        }
    }
}

// Ein verworfener Stream darf das Gerät nicht offen halten
impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

// ============================================================================
// MEDIA DEVICES
// ============================================================================

/// Plattform-API zum Öffnen von Aufnahmegeräten
pub trait MediaDevices: Send + Sync {
    /// Öffnet Aufnahmegeräte passend zu den Constraints
    ///
    /// Kann unbegrenzt warten, z.B. auf einen Berechtigungs-Dialog.
    fn get_user_media<'a>(
        &'a self,
        constraints: &'a MediaStreamConstraints,
    ) -> BoxFuture<'a, Result<MediaStream, MediaError>>;
}
