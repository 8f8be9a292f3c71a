//! Capability Probe
//!
//! Prüft ob die Laufzeitumgebung Peer Connections und Medienaufnahme
//! unterstützt, bevor ein Anruf gestartet wird.

use super::cpal_devices::CpalDevices;
use super::devices::MediaDevices;
use crate::error::CallError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Fehlende Grundfunktion der Laufzeitumgebung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingCapability {
    PeerConnection,
    MediaCapture,
}

impl MissingCapability {
    /// Stabiler Schlüssel für Telemetrie
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingCapability::PeerConnection => "peer_connection",
            MissingCapability::MediaCapture => "media_capture",
        }
    }
}

impl fmt::Display for MissingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingCapability::PeerConnection => f.write_str("peer connections unsupported"),
            MissingCapability::MediaCapture => f.write_str("media capture unsupported"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{missing}")]
    UnsupportedEnvironment { missing: MissingCapability },
}

impl CapabilityError {
    pub fn missing(&self) -> MissingCapability {
        match self {
            CapabilityError::UnsupportedEnvironment { missing } => *missing,
        }
    }
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Laufzeitumgebung eines Anrufs
pub trait MediaEnvironment: Send + Sync {
    /// Kann die Umgebung Peer Connections erzeugen?
    fn supports_peer_connections(&self) -> bool;

    /// Capture-API mit `getUserMedia`, falls vorhanden
    fn media_devices(&self) -> Option<Arc<dyn MediaDevices>>;
}

/// Prüft die Unterstützung in fester Reihenfolge: erst Peer Connections,
/// dann Medienaufnahme. Bricht beim ersten Fehlen ab.
pub fn check_support(env: &dyn MediaEnvironment) -> Result<(), CapabilityError> {
    if !env.supports_peer_connections() {
        return Err(CapabilityError::UnsupportedEnvironment {
            missing: MissingCapability::PeerConnection,
        });
    }

    if env.media_devices().is_none() {
        return Err(CapabilityError::UnsupportedEnvironment {
            missing: MissingCapability::MediaCapture,
        });
    }

    Ok(())
}

/// Umgebung, deren Fähigkeiten vom Host vorgegeben werden
/// (z.B. eine Webview-Brücke)
#[derive(Clone, Default)]
pub struct HostEnvironment {
    pub peer_connections: bool,
    pub devices: Option<Arc<dyn MediaDevices>>,
}

impl MediaEnvironment for HostEnvironment {
    fn supports_peer_connections(&self) -> bool {
        self.peer_connections
    }

    fn media_devices(&self) -> Option<Arc<dyn MediaDevices>> {
        self.devices.clone()
    }
}

impl fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("peer_connections", &self.peer_connections)
            .field("devices", &self.devices.is_some())
            .finish()
    }
}

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// Standard STUN Server Konfiguration
pub fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
        ],
        ..Default::default()
    }]
}

// ============================================================================
// NATIVE ENVIRONMENT
// ============================================================================

/// Native Umgebung: webrtc-rs für Peer Connections, cpal für Audio
pub struct NativeEnvironment {
    api: Option<API>,
    devices: Option<Arc<CpalDevices>>,
    ice_servers: Vec<RTCIceServer>,
}

impl NativeEnvironment {
    /// Ermittelt die verfügbaren Fähigkeiten
    pub fn detect() -> Self {
        let api = match build_api() {
            Ok(api) => Some(api),
            Err(e) => {
                tracing::warn!("WebRTC API unavailable: {}", e);
                None
            }
        };

        let devices = if cpal::available_hosts().is_empty() {
            tracing::warn!("No audio host available");
            None
        } else {
            Some(Arc::new(CpalDevices::new()))
        };

        tracing::info!(
            "Native environment: peer connections {}, media capture {}",
            api.is_some(),
            devices.is_some()
        );

        Self {
            api,
            devices,
            ice_servers: default_ice_servers(),
        }
    }

    /// Setzt optionale TURN-Server Credentials
    pub fn set_turn_server(&mut self, url: String, username: String, credential: String) {
        self.ice_servers.push(RTCIceServer {
            urls: vec![url],
            username,
            credential,
            ..Default::default()
        });
    }

    pub fn ice_servers(&self) -> &[RTCIceServer] {
        &self.ice_servers
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        }
    }

    /// Erstellt eine neue Peer Connection
    pub async fn new_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, CallError> {
        let api = self.api.as_ref().ok_or(CapabilityError::UnsupportedEnvironment {
            missing: MissingCapability::PeerConnection,
        })?;

        let pc = api
            .new_peer_connection(self.rtc_configuration())
            .await
            .map_err(|e| CallError::from_transport_failure(e.to_string()))?;

        Ok(Arc::new(pc))
    }
}

impl MediaEnvironment for NativeEnvironment {
    fn supports_peer_connections(&self) -> bool {
        self.api.is_some()
    }

    fn media_devices(&self) -> Option<Arc<dyn MediaDevices>> {
        self.devices
            .as_ref()
            .map(|d| Arc::clone(d) as Arc<dyn MediaDevices>)
    }
}

impl fmt::Debug for NativeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEnvironment")
            .field("peer_connections", &self.api.is_some())
            .field("devices", &self.devices)
            .field("ice_servers", &self.ice_servers.len())
            .finish()
    }
}

/// Media Engine mit Standard-Codecs und Interceptors (RTCP, NACK etc.)
fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CpalDevices;

    #[test]
    fn test_missing_peer_connection_checked_first() {
        let env = HostEnvironment::default();
        let err = check_support(&env).unwrap_err();

        assert_eq!(err.missing(), MissingCapability::PeerConnection);
        assert_eq!(err.to_string(), "peer connections unsupported");
    }

    #[test]
    fn test_missing_media_capture() {
        let env = HostEnvironment {
            peer_connections: true,
            devices: None,
        };
        let err = check_support(&env).unwrap_err();

        assert_eq!(err.missing(), MissingCapability::MediaCapture);
        assert_eq!(err.to_string(), "media capture unsupported");
        assert_ne!(
            err,
            CapabilityError::UnsupportedEnvironment {
                missing: MissingCapability::PeerConnection
            }
        );
    }

    #[test]
    fn test_supported_and_repeatable() {
        let env = HostEnvironment {
            peer_connections: true,
            devices: Some(Arc::new(CpalDevices::new())),
        };

        for _ in 0..3 {
            assert!(check_support(&env).is_ok());
        }
    }

    #[test]
    fn test_telemetry_keys_are_distinct() {
        assert_ne!(
            MissingCapability::PeerConnection.as_str(),
            MissingCapability::MediaCapture.as_str()
        );
    }

    #[tokio::test]
    async fn test_native_environment_builds_peer_connection() {
        let env = NativeEnvironment::detect();
        assert!(env.supports_peer_connections());

        let pc = env.new_peer_connection().await.unwrap();
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_turn_server_reaches_peer_connection() {
        let mut env = NativeEnvironment::detect();
        let stun_count = env.ice_servers().len();

        env.set_turn_server(
            "turn:turn.example.org:3478".to_string(),
            "alice".to_string(),
            "secret".to_string(),
        );
        assert_eq!(env.ice_servers().len(), stun_count + 1);

        let pc = env.new_peer_connection().await.unwrap();
        let turn = pc
            .get_configuration()
            .ice_servers
            .iter()
            .find(|s| s.urls.iter().any(|u| u.starts_with("turn:")))
            .cloned()
            .unwrap();
        assert_eq!(turn.username, "alice");
        assert_eq!(turn.credential, "secret");

        pc.close().await.unwrap();
    }
}
