//! Call Engine
//!
//! Führt einen Anruf durch die lokalen Vorbereitungsschritte und überwacht
//! danach die Verbindungsqualität:
//! Capability Check → Permission Check → Constraint-Profil → Quality Monitor.
//!
//! Signaling (Offer/Answer, ICE) passiert außerhalb, die Engine bekommt eine
//! bereits aufgebaute Peer Connection übergeben.

use crate::config::MonitorConfig;
use crate::error::CallError;
use crate::media::{
    check_support, plan_constraints, request_permissions, CallType, CapabilityError,
    ConstraintProfile, MediaEnvironment, MediaStreamConstraints, MissingCapability,
};
use crate::quality::{start_monitoring_with, MonitorHandle, QualitySample, StatsProvider};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

// ============================================================================
// CALL STATE
// ============================================================================

/// Aktueller Status eines Anrufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// Kein aktiver Anruf
    Idle,
    /// Capability- und Permission-Check laufen
    Preparing { call_type: CallType },
    /// Geräte freigegeben, Profil steht, wartet auf die Peer Connection
    Ready {
        call_type: CallType,
        profile: ConstraintProfile,
    },
    /// Verbindung steht, Qualität wird überwacht
    Active { call_type: CallType },
    /// Anruf beendet
    Ended,
}

/// Events die vom CallEngine ausgelöst werden
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged(CallState),
    Quality(QualitySample),
    Error(String),
}

// ============================================================================
// CALL ENGINE
// ============================================================================

/// Orchestriert einen Anruf zur Zeit
pub struct CallEngine {
    env: Arc<dyn MediaEnvironment>,
    config: MonitorConfig,
    state: Arc<Mutex<CallState>>,
    monitor: Arc<Mutex<Option<MonitorHandle>>>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CallEngine {
    /// Erstellt eine neue CallEngine, Monitor-Timing aus der Umgebung
    pub fn new(env: Arc<dyn MediaEnvironment>) -> Self {
        Self::with_config(env, MonitorConfig::from_env())
    }

    pub fn with_config(env: Arc<dyn MediaEnvironment>, config: MonitorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            env,
            config,
            state: Arc::new(Mutex::new(CallState::Idle)),
            monitor: Arc::new(Mutex::new(None)),
            event_tx,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    /// Gibt den aktuellen Call-Status zurück
    pub fn state(&self) -> CallState {
        self.state.lock().clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .map(|m| m.is_monitoring() && !m.is_stopped())
            .unwrap_or(false)
    }

    /// Bereitet einen Anruf vor
    ///
    /// Gibt das Constraint-Profil für die Medienaufnahme zurück. Schlägt ein
    /// Schritt fehl oder wird das Future verworfen, geht die Engine zurück
    /// auf `Idle`. Wird der Anruf währenddessen beendet, gibt es
    /// `NoActiveCall`.
    pub async fn prepare_call(&self, call_type: CallType) -> Result<ConstraintProfile, CallError> {
        {
            let mut state = self.state.lock();
            match *state {
                CallState::Idle | CallState::Ended => {
                    *state = CallState::Preparing { call_type };
                }
                _ => return Err(CallError::AlreadyInCall),
            }
        }
        let _ = self
            .event_tx
            .send(CallEvent::StateChanged(CallState::Preparing { call_type }));

        let mut guard = PreparingGuard {
            state: &self.state,
            event_tx: &self.event_tx,
            armed: true,
        };

        tracing::info!("Preparing {} call", call_type);

        match self.negotiate(call_type).await {
            Ok(profile) => {
                let ready = {
                    let mut state = self.state.lock();
                    if *state == (CallState::Preparing { call_type }) {
                        *state = CallState::Ready { call_type, profile };
                        true
                    } else {
                        false
                    }
                };
                guard.armed = false;

                if !ready {
                    tracing::info!("Call ended during preparation");
                    return Err(CallError::NoActiveCall);
                }

                let _ = self
                    .event_tx
                    .send(CallEvent::StateChanged(CallState::Ready { call_type, profile }));
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!("Call preparation failed: {}", e);
                let _ = self
                    .event_tx
                    .send(CallEvent::Error(e.user_message().to_string()));
                Err(e)
            }
        }
    }

    /// Startet das Quality Monitoring für eine aufgebaute Verbindung
    ///
    /// Ohne Verbindung oder ohne Stats läuft der Anruf trotzdem, nur ohne
    /// Quality-Events.
    pub fn attach_connection(
        &self,
        connection: Option<Arc<dyn StatsProvider>>,
    ) -> Result<(), CallError> {
        // Lock-Reihenfolge: state vor monitor, wie in `teardown`
        let mut state = self.state.lock();
        let call_type = match *state {
            CallState::Ready { call_type, .. } => call_type,
            _ => return Err(CallError::NoActiveCall),
        };

        let event_tx = self.event_tx.clone();
        let handle = start_monitoring_with(self.config, connection, move |sample| {
            let _ = event_tx.send(CallEvent::Quality(sample));
        });

        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.stop();
        }

        *state = CallState::Active { call_type };
        drop(state);

        let _ = self
            .event_tx
            .send(CallEvent::StateChanged(CallState::Active { call_type }));
        Ok(())
    }

    /// Wie `attach_connection`, beendet den Anruf zusätzlich wenn die
    /// Peer Connection abbricht
    pub fn attach_peer_connection(&self, pc: Arc<RTCPeerConnection>) -> Result<(), CallError> {
        self.attach_connection(Some(Arc::clone(&pc) as Arc<dyn StatsProvider>))?;

        let state = Arc::clone(&self.state);
        let monitor = Arc::clone(&self.monitor);
        let event_tx = self.event_tx.clone();

        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", s);

            match s {
                RTCPeerConnectionState::Failed => {
                    let err = CallError::from_transport_failure("ICE connection failed");
                    let _ = event_tx.send(CallEvent::Error(err.user_message().to_string()));
                    teardown(&state, &monitor, &event_tx);
                }
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Closed => {
                    teardown(&state, &monitor, &event_tx);
                }
                _ => {}
            }

            Box::pin(async {})
        }));

        Ok(())
    }

    /// Beendet den aktuellen Anruf
    ///
    /// Stoppt den Monitor genau einmal. Nach kurzer Zeit geht die Engine
    /// zurück auf `Idle`.
    pub fn end_call(&self) {
        teardown(&self.state, &self.monitor, &self.event_tx);

        let state = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
                    reset_to_idle(&state, &event_tx);
                });
            }
            Err(_) => reset_to_idle(&state, &event_tx),
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    async fn negotiate(&self, call_type: CallType) -> Result<ConstraintProfile, CallError> {
        check_support(self.env.as_ref())?;

        let devices = self
            .env
            .media_devices()
            .ok_or(CapabilityError::UnsupportedEnvironment {
                missing: MissingCapability::MediaCapture,
            })?;

        request_permissions(devices, MediaStreamConstraints::for_call(call_type)).await?;

        Ok(plan_constraints(call_type))
    }
}

impl std::fmt::Debug for CallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEngine")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("is_monitoring", &self.is_monitoring())
            .finish()
    }
}

/// Setzt `Preparing` auf `Idle` zurück, wenn die Vorbereitung nicht
/// abgeschlossen wurde
struct PreparingGuard<'a> {
    state: &'a Mutex<CallState>,
    event_tx: &'a broadcast::Sender<CallEvent>,
    armed: bool,
}

impl Drop for PreparingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let reset = {
            let mut state = self.state.lock();
            if matches!(*state, CallState::Preparing { .. }) {
                *state = CallState::Idle;
                true
            } else {
                false
            }
        };

        if reset {
            tracing::info!("Call preparation did not complete, back to idle");
            let _ = self.event_tx.send(CallEvent::StateChanged(CallState::Idle));
        }
    }
}

/// Stoppt den Monitor und setzt `Ended`, falls nicht schon geschehen
fn teardown(
    state: &Mutex<CallState>,
    monitor: &Mutex<Option<MonitorHandle>>,
    event_tx: &broadcast::Sender<CallEvent>,
) {
    let changed = {
        let mut state = state.lock();
        if let Some(handle) = monitor.lock().take() {
            handle.stop();
        }

        match *state {
            CallState::Idle | CallState::Ended => false,
            _ => {
                *state = CallState::Ended;
                true
            }
        }
    };

    if changed {
        tracing::info!("Call ended");
        let _ = event_tx.send(CallEvent::StateChanged(CallState::Ended));
    }
}

/// Ein inzwischen neu gestarteter Anruf wird nicht überschrieben
fn reset_to_idle(state: &Mutex<CallState>, event_tx: &broadcast::Sender<CallEvent>) {
    let reset = {
        let mut state = state.lock();
        if *state == CallState::Ended {
            *state = CallState::Idle;
            true
        } else {
            false
        }
    };

    if reset {
        let _ = event_tx.send(CallEvent::StateChanged(CallState::Idle));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FakeDevices, HostEnvironment, MediaError, NativeEnvironment};
    use crate::quality::{StatsError, StatsRecord};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Sendet pro Abfrage 25000 Bytes mehr (100 kbps bei 2s Abstand)
    struct SteadyStats {
        bytes: AtomicU64,
    }

    impl StatsProvider for SteadyStats {
        fn query_stats(&self) -> BoxFuture<'_, Result<Vec<StatsRecord>, StatsError>> {
            Box::pin(async move {
                let bytes = self.bytes.fetch_add(25_000, Ordering::SeqCst);
                Ok(vec![
                    StatsRecord::outbound(bytes),
                    StatsRecord::remote_inbound(0, 500),
                ])
            })
        }
    }

    fn engine_with(devices: Option<FakeDevices>, peer_connections: bool) -> CallEngine {
        let env = HostEnvironment {
            peer_connections,
            devices: devices.map(|d| Arc::new(d) as Arc<dyn crate::media::MediaDevices>),
        };
        CallEngine::with_config(Arc::new(env), MonitorConfig::default())
    }

    fn drain(rx: &mut broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_prepare_audio_call() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        let mut rx = engine.subscribe();

        let profile = engine.prepare_call(CallType::Audio).await.unwrap();
        assert!(!profile.video.is_requested());
        assert_eq!(
            engine.state(),
            CallState::Ready {
                call_type: CallType::Audio,
                profile
            }
        );

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            CallEvent::StateChanged(CallState::Preparing { .. })
        ));
        assert!(matches!(
            events[1],
            CallEvent::StateChanged(CallState::Ready { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_environment_keeps_cause() {
        let engine = engine_with(Some(FakeDevices::granting()), false);
        let mut rx = engine.subscribe();

        let err = engine.prepare_call(CallType::Video).await.unwrap_err();
        assert_eq!(
            err,
            CallError::Unsupported(CapabilityError::UnsupportedEnvironment {
                missing: MissingCapability::PeerConnection
            })
        );
        assert_eq!(engine.state(), CallState::Idle);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CallEvent::Error(_))));

        let engine = engine_with(None, true);
        let err = engine.prepare_call(CallType::Audio).await.unwrap_err();
        assert_eq!(
            err,
            CallError::Unsupported(CapabilityError::UnsupportedEnvironment {
                missing: MissingCapability::MediaCapture
            })
        );
    }

    #[tokio::test]
    async fn test_permission_denied_returns_to_idle() {
        let denied = MediaError::PermissionDenied("blocked".to_string());
        let engine = engine_with(Some(FakeDevices::failing(denied.clone())), true);

        let err = engine.prepare_call(CallType::Audio).await.unwrap_err();
        assert_eq!(err, CallError::Media(denied));
        assert_eq!(engine.state(), CallState::Idle);

        // Erneuter Versuch ist möglich
        assert!(matches!(
            engine.prepare_call(CallType::Audio).await,
            Err(CallError::Media(MediaError::PermissionDenied(_)))
        ));
    }

    #[tokio::test]
    async fn test_abandoned_prepare_returns_to_idle() {
        let prompt = Arc::new(Notify::new());
        let engine = engine_with(
            Some(FakeDevices {
                prompt: Some(Arc::clone(&prompt)),
                ..FakeDevices::granting()
            }),
            true,
        );
        let mut rx = engine.subscribe();

        // Benutzer verlässt die Ansicht, während der Prompt offen ist
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), engine.prepare_call(CallType::Audio))
                .await;
        assert!(abandoned.is_err());
        assert_eq!(engine.state(), CallState::Idle);
        assert!(matches!(
            drain(&mut rx).last(),
            Some(CallEvent::StateChanged(CallState::Idle))
        ));

        // Ein Prompt für die alte Anfrage, einer für den neuen Versuch
        prompt.notify_one();
        prompt.notify_one();

        let profile = engine.prepare_call(CallType::Audio).await.unwrap();
        assert_eq!(
            engine.state(),
            CallState::Ready {
                call_type: CallType::Audio,
                profile
            }
        );
    }

    #[tokio::test]
    async fn test_hangup_during_preparation() {
        let prompt = Arc::new(Notify::new());
        let engine = engine_with(
            Some(FakeDevices {
                prompt: Some(Arc::clone(&prompt)),
                ..FakeDevices::granting()
            }),
            true,
        );

        let (result, _) = tokio::join!(engine.prepare_call(CallType::Audio), async {
            while !matches!(engine.state(), CallState::Preparing { .. }) {
                tokio::task::yield_now().await;
            }
            engine.end_call();
            prompt.notify_one();
        });

        assert_eq!(result.unwrap_err(), CallError::NoActiveCall);
        assert_eq!(engine.state(), CallState::Ended);
        assert!(!engine.is_monitoring());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hangup_racing_attach_leaves_no_monitor() {
        for _ in 0..50 {
            let engine = Arc::new(engine_with(Some(FakeDevices::granting()), true));
            engine.prepare_call(CallType::Audio).await.unwrap();

            let stats: Arc<dyn StatsProvider> = Arc::new(SteadyStats {
                bytes: AtomicU64::new(0),
            });
            let attacher = {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let _ = engine.attach_connection(Some(stats));
                })
            };
            let hangup = {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.end_call() })
            };
            attacher.await.unwrap();
            hangup.await.unwrap();

            assert_eq!(engine.state(), CallState::Ended);
            assert!(!engine.is_monitoring());
        }
    }

    #[tokio::test]
    async fn test_attach_after_hangup_is_rejected() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        engine.prepare_call(CallType::Audio).await.unwrap();
        engine.end_call();

        let stats = Arc::new(SteadyStats {
            bytes: AtomicU64::new(0),
        });
        assert_eq!(
            engine
                .attach_connection(Some(stats as Arc<dyn StatsProvider>))
                .unwrap_err(),
            CallError::NoActiveCall
        );
        assert!(!engine.is_monitoring());
    }

    #[tokio::test]
    async fn test_second_prepare_is_rejected() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        engine.prepare_call(CallType::Audio).await.unwrap();

        assert_eq!(
            engine.prepare_call(CallType::Video).await.unwrap_err(),
            CallError::AlreadyInCall
        );
    }

    #[tokio::test]
    async fn test_attach_requires_prepared_call() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        assert_eq!(
            engine.attach_connection(None).unwrap_err(),
            CallError::NoActiveCall
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_events_until_hangup() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        let mut rx = engine.subscribe();
        engine.prepare_call(CallType::Audio).await.unwrap();

        let stats = Arc::new(SteadyStats {
            bytes: AtomicU64::new(0),
        });
        engine
            .attach_connection(Some(stats as Arc<dyn StatsProvider>))
            .unwrap();
        assert!(engine.is_monitoring());
        assert_eq!(
            engine.state(),
            CallState::Active {
                call_type: CallType::Audio
            }
        );

        tokio::time::sleep(Duration::from_millis(4100)).await;
        let quality: Vec<QualitySample> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::Quality(sample) => Some(sample),
                _ => None,
            })
            .collect();
        // Samples bei 1s, 2s, 4s
        assert_eq!(quality.len(), 3);
        assert_eq!(quality[0].bitrate_kbps, 0);
        assert_eq!(quality[1].bitrate_kbps, 200);
        assert_eq!(quality[2].bitrate_kbps, 100);
        assert_eq!(quality[2].quality.value(), 5);

        engine.end_call();
        engine.end_call();
        assert_eq!(engine.state(), CallState::Ended);
        assert!(!engine.is_monitoring());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, CallEvent::Quality(_))));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, CallEvent::StateChanged(CallState::Ended)))
                .count(),
            1
        );
        assert_eq!(engine.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn test_call_without_stats_still_runs() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        let profile = engine.prepare_call(CallType::Video).await.unwrap();
        assert!(profile.video.is_requested());

        engine.attach_connection(None).unwrap();
        assert_eq!(
            engine.state(),
            CallState::Active {
                call_type: CallType::Video
            }
        );
        assert!(!engine.is_monitoring());

        engine.end_call();
        assert_eq!(engine.state(), CallState::Ended);
    }

    #[tokio::test]
    async fn test_attach_native_peer_connection() {
        let engine = engine_with(Some(FakeDevices::granting()), true);
        engine.prepare_call(CallType::Audio).await.unwrap();

        let pc = NativeEnvironment::detect()
            .new_peer_connection()
            .await
            .unwrap();
        engine.attach_peer_connection(Arc::clone(&pc)).unwrap();
        assert!(engine.is_monitoring());

        engine.end_call();
        assert!(!engine.is_monitoring());
        pc.close().await.unwrap();
    }
}
