//! Native Capture-Geräte über cpal
//!
//! Öffnet das Standard-Mikrofon mit den angefragten Audio-Constraints.
//! Eine Kamera-Anbindung gibt es nicht, Video-Anfragen schlagen daher mit
//! `DeviceNotFound` fehl.

use super::constraints::{AudioConstraints, MediaStreamConstraints};
use super::devices::{MediaDevices, MediaError, MediaStream, MediaStreamTrack, TrackKind};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, Device, HostId, PlayStreamError, SampleFormat, Stream,
    SupportedStreamConfig, SupportedStreamConfigRange,
};
use futures::future::BoxFuture;

// ============================================================================
// CPAL DEVICES
// ============================================================================

/// `MediaDevices` für den cpal Audio-Host
#[derive(Debug, Clone, Copy)]
pub struct CpalDevices {
    host_id: HostId,
}

impl CpalDevices {
    /// Verwendet den Standard-Host der Plattform
    pub fn new() -> Self {
        Self::with_host(cpal::default_host().id())
    }

    pub fn with_host(host_id: HostId) -> Self {
        Self { host_id }
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    /// Öffnet die angefragten Geräte (synchron)
    fn open(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream, MediaError> {
        if constraints.video.is_requested() {
            return Err(MediaError::DeviceNotFound(
                "no video capture backend available".to_string(),
            ));
        }
        if !constraints.audio.is_requested() {
            return Err(MediaError::Other(
                "at least one of audio or video must be requested".to_string(),
            ));
        }

        let host = cpal::host_from_id(self.host_id).map_err(|e| MediaError::Other(e.to_string()))?;
        let device = host
            .default_input_device()
            .ok_or_else(|| MediaError::DeviceNotFound("no audio input device".to_string()))?;

        let audio = constraints.audio.constraints().copied().unwrap_or_default();
        let config = find_input_config(&device, &audio)?;

        tracing::info!(
            "Opening audio capture: {} Hz, {} channel(s), {:?}",
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        // Daten werden verworfen, der Stream dient nur dem Zugriff aufs Gerät
        let stream = device
            .build_input_stream_raw(
                &config.config(),
                config.sample_format(),
                |_data: &cpal::Data, _: &cpal::InputCallbackInfo| {},
                |err| {
                    tracing::error!("Audio capture error: {}", err);
                },
                None,
            )
            .map_err(map_build_error)?;

        stream.play().map_err(map_play_error)?;

        Ok(MediaStream::new(vec![Box::new(CpalTrack {
            stream: Some(stream),
        })]))
    }
}

impl Default for CpalDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for CpalDevices {
    fn get_user_media<'a>(
        &'a self,
        constraints: &'a MediaStreamConstraints,
    ) -> BoxFuture<'a, Result<MediaStream, MediaError>> {
        Box::pin(async move { self.open(constraints) })
    }
}

// ============================================================================
// TRACK
// ============================================================================

/// Mikrofon-Track, das Droppen des Streams beendet die Aufnahme
struct CpalTrack {
    stream: Option<Stream>,
}

// Stream ist nicht auf allen Plattformen Send. Der Track wird nur
// verschoben und gestoppt, nie parallel benutzt.
unsafe impl Send for CpalTrack {}

impl MediaStreamTrack for CpalTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("Audio capture stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }
}

// ============================================================================
// CONFIG SELECTION
// ============================================================================

fn find_input_config(
    device: &Device,
    audio: &AudioConstraints,
) -> Result<SupportedStreamConfig, MediaError> {
    let configs = device
        .supported_input_configs()
        .map_err(|e| MediaError::Other(e.to_string()))?;

    select_input_config(configs.collect(), audio)
}

/// Wählt die beste Konfiguration aus einer Liste
///
/// Priorität: passende Kanäle + Sample Rate + F32 > passende Sample Rate >
/// erste verfügbare Konfiguration.
fn select_input_config(
    configs: Vec<SupportedStreamConfigRange>,
    audio: &AudioConstraints,
) -> Result<SupportedStreamConfig, MediaError> {
    let target_rate = cpal::SampleRate(audio.sample_rate);
    let supports_rate = |config: &SupportedStreamConfigRange| {
        config.min_sample_rate() <= target_rate && config.max_sample_rate() >= target_rate
    };

    for config in &configs {
        if config.channels() == audio.channel_count
            && supports_rate(config)
            && config.sample_format() == SampleFormat::F32
        {
            return Ok(config.clone().with_sample_rate(target_rate));
        }
    }

    for config in &configs {
        if supports_rate(config) {
            return Ok(config.clone().with_sample_rate(target_rate));
        }
    }

    if let Some(config) = configs.first() {
        return Ok(config.clone().with_max_sample_rate());
    }

    Err(MediaError::DeviceNotFound(
        "no supported audio input configuration".to_string(),
    ))
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn map_build_error(err: BuildStreamError) -> MediaError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            MediaError::DeviceNotFound("audio input device not available".to_string())
        }
        BuildStreamError::BackendSpecific { err } => classify_backend_message(&err.description),
        other => MediaError::Other(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> MediaError {
    match err {
        PlayStreamError::DeviceNotAvailable => {
            MediaError::DeviceNotFound("audio input device not available".to_string())
        }
        PlayStreamError::BackendSpecific { err } => classify_backend_message(&err.description),
    }
}

/// Backends melden verweigerten Zugriff nur als Text
fn classify_backend_message(message: &str) -> MediaError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted")
    {
        MediaError::PermissionDenied(message.to_string())
    } else {
        MediaError::Other(message.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
