//! Permission Negotiator
//!
//! Fragt kurz Zugriff auf die Aufnahmegeräte an und gibt ihn sofort wieder
//! frei. Ergebnis ist nur der Berechtigungsstatus, kein offener Stream.

use super::constraints::MediaStreamConstraints;
use super::devices::{MediaDevices, MediaError};
use std::sync::Arc;

/// Prüft die Berechtigung durch eine transiente Capture-Anfrage
///
/// Acquire und Release laufen in einem eigenen Task. Verwirft der Aufrufer
/// das Future (z.B. weil der Benutzer die Ansicht verlässt), werden die
/// Tracks trotzdem gestoppt, sobald die Anfrage erfolgreich zurückkommt.
///
/// Fehler des Geräts werden unverändert weitergegeben.
pub async fn request_permissions(
    devices: Arc<dyn MediaDevices>,
    constraints: MediaStreamConstraints,
) -> Result<(), MediaError> {
    tracing::info!(
        "Requesting capture permission (audio: {}, video: {})",
        constraints.audio.is_requested(),
        constraints.video.is_requested()
    );

    let task = tokio::spawn(async move {
        let mut stream = devices.get_user_media(&constraints).await?;
        let track_count = stream.track_count();
        stream.stop_all();
        tracing::debug!("Released {} track(s) after permission check", track_count);
        Ok(())
    });

    match task.await {
        Ok(result) => {
            if let Err(ref e) = result {
                tracing::warn!("Capture permission request failed: {}", e);
            }
            result
        }
        Err(e) => Err(MediaError::Other(format!(
            "permission request aborted: {}",
            e
        ))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
