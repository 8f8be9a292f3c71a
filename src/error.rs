//! Fehler-Taxonomie eines Anrufversuchs
//!
//! Capability- und Permission-Fehler werden unverändert eingebettet, damit
//! Aufrufer nach Art verzweigen können. Statistik-Fehler tauchen hier nicht
//! auf, sie bleiben im Quality Monitor.

use crate::media::{CapabilityError, MediaError};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Art eines Transportfehlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// ICE-Verbindungsaufbau fehlgeschlagen
    Ice,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Unsupported(#[from] CapabilityError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Transport error: {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("No active call")]
    NoActiveCall,

    #[error("Already in a call")]
    AlreadyInCall,
}

impl CallError {
    /// Ordnet eine Fehlermeldung des Transports ein
    ///
    /// ICE-Fehler werden nur über den Meldungstext erkannt.
    pub fn from_transport_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        // "device" etc. dürfen nicht als ICE zählen
        let mentions_ice = message
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word.eq_ignore_ascii_case("ice") || word.starts_with("ICE"));
        let kind = if mentions_ice {
            TransportKind::Ice
        } else {
            TransportKind::Other
        };
        CallError::Transport { kind, message }
    }

    /// Text für die Anzeige beim Benutzer
    pub fn user_message(&self) -> &'static str {
        match self {
            CallError::Unsupported(_) => "Calls are not available on this device.",
            CallError::Media(MediaError::PermissionDenied(_)) => {
                "Microphone or camera access was denied. Allow access and try again."
            }
            CallError::Media(MediaError::DeviceNotFound(_)) => {
                "No microphone or camera was found."
            }
            CallError::Media(MediaError::Other(_)) | CallError::Transport { .. } => {
                "Connection problem. Please check your network and try again."
            }
            CallError::NoActiveCall => "There is no active call.",
            CallError::AlreadyInCall => "A call is already in progress.",
        }
    }

    /// Darf der Benutzer es erneut versuchen?
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CallError::Unsupported(_) | CallError::Media(MediaError::DeviceNotFound(_))
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MissingCapability;

    #[test]
    fn test_ice_failures_are_classified() {
        let err = CallError::from_transport_failure("ICE connection state: failed");
        assert!(matches!(
            err,
            CallError::Transport {
                kind: TransportKind::Ice,
                ..
            }
        ));

        let err = CallError::from_transport_failure("ICEAgent: no candidate pairs");
        assert!(matches!(
            err,
            CallError::Transport {
                kind: TransportKind::Ice,
                ..
            }
        ));

        let err = CallError::from_transport_failure("audio device disconnected");
        assert!(matches!(
            err,
            CallError::Transport {
                kind: TransportKind::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_wrapped_errors_keep_their_kind() {
        let err: CallError = MediaError::PermissionDenied("prompt".into()).into();
        assert_eq!(
            err,
            CallError::Media(MediaError::PermissionDenied("prompt".into()))
        );
        assert_eq!(err.to_string(), "Permission denied: prompt");
        assert!(err.is_retryable());

        let err: CallError = CapabilityError::UnsupportedEnvironment {
            missing: MissingCapability::MediaCapture,
        }
        .into();
        assert_eq!(err.to_string(), "media capture unsupported");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_denied_and_missing_have_distinct_messages() {
        let denied = CallError::Media(MediaError::PermissionDenied(String::new()));
        let missing = CallError::Media(MediaError::DeviceNotFound(String::new()));
        assert_ne!(denied.user_message(), missing.user_message());
    }
}
