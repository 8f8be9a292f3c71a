//! Quality Monitor
//!
//! Fragt periodisch die Transport-Statistiken einer aktiven Peer Connection
//! ab und liefert pro Tick ein `QualitySample` an einen Beobachter.
//!
//! Ablauf:
//! - erstes Sample nach `initial_delay` (Standard 1s)
//! - danach alle `interval` ab Start (Standard 2s, 4s, 6s, ...)
//! - fehlgeschlagene Abfragen werden übersprungen
//! - ein verspäteter Tick feuert einmal sofort, danach wieder im Raster
//! - eine geschlossene Verbindung beendet den Monitor
//! - nach `stop()` wird kein Sample mehr geliefert, auch nicht aus einer
//!   Abfrage, die vorher gestartet wurde

use super::score::{score_quality, QualitySample};
use super::stats::{StatsError, StatsProvider, StatsSnapshot};
use crate::config::MonitorConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

// ============================================================================
// SAMPLER
// ============================================================================

/// Zustand zwischen zwei Ticks
///
/// Es wird keine Historie gehalten, nur der letzte Byte-Zähler und sein
/// Zeitpunkt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sampler {
    last: Option<(u64, Instant)>,
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Berechnet ein Sample und übernimmt den Snapshot als neuen Bezugspunkt
    pub fn ingest(&mut self, snapshot: &StatsSnapshot, now: Instant) -> QualitySample {
        let bytes_now = snapshot.bytes_sent;

        // Zurückgesetzter Zähler zählt als Delta 0
        let bitrate_kbps = match self.last {
            Some((last_bytes, last_ts)) if bytes_now >= last_bytes => {
                let delta_ms = now.saturating_duration_since(last_ts).as_secs_f64() * 1000.0;
                if delta_ms > 0.0 {
                    ((bytes_now - last_bytes) as f64 * 8.0 / delta_ms).round() as u64
                } else {
                    0
                }
            }
            _ => 0,
        };

        let packet_loss = snapshot.loss_ratio();
        self.last = Some((bytes_now, now));

        QualitySample {
            quality: score_quality(packet_loss, bitrate_kbps),
            bitrate_kbps,
            packet_loss,
        }
    }
}

// ============================================================================
// MONITOR HANDLE
// ============================================================================

#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Stop-Capability eines laufenden Monitors
///
/// Wird der Handle gedroppt, stoppt der Monitor ebenfalls.
#[derive(Debug)]
pub struct MonitorHandle {
    signal: Option<Arc<StopSignal>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Handle ohne Monitor, `stop()` bewirkt nichts
    fn inert() -> Self {
        Self {
            signal: None,
            task: None,
        }
    }

    /// Beendet das Monitoring. Weitere Aufrufe sind wirkungslos.
    pub fn stop(&self) {
        if let Some(signal) = &self.signal {
            if !signal.stopped.swap(true, Ordering::SeqCst) {
                signal.notify.notify_one();
                tracing::info!("Quality monitor stopped");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.as_ref().map_or(true, |s| s.is_stopped())
    }

    /// `false` im degradierten Modus (keine Verbindung / keine Stats)
    pub fn is_monitoring(&self) -> bool {
        self.signal.is_some()
    }

    /// Stoppt und wartet bis der Monitor-Task beendet ist
    ///
    /// Eine laufende Stats-Abfrage wird nicht abgebrochen, sondern abgewartet.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Quality monitor task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// START
// ============================================================================

/// Startet das Monitoring mit der Standard-Konfiguration
pub fn start_monitoring<F>(connection: Option<Arc<dyn StatsProvider>>, on_sample: F) -> MonitorHandle
where
    F: FnMut(QualitySample) + Send + 'static,
{
    start_monitoring_with(MonitorConfig::default(), connection, on_sample)
}

/// Startet das Monitoring
///
/// Ohne Verbindung, ohne Stats-Abfrage oder außerhalb einer tokio-Runtime
/// wird ein wirkungsloser Handle zurückgegeben und `on_sample` nie
/// aufgerufen.
pub fn start_monitoring_with<F>(
    config: MonitorConfig,
    connection: Option<Arc<dyn StatsProvider>>,
    on_sample: F,
) -> MonitorHandle
where
    F: FnMut(QualitySample) + Send + 'static,
{
    let connection = match connection {
        Some(connection) if connection.supports_stats() => connection,
        Some(_) => {
            tracing::warn!("Connection exposes no stats, quality monitoring disabled");
            return MonitorHandle::inert();
        }
        None => {
            tracing::warn!("No connection, quality monitoring disabled");
            return MonitorHandle::inert();
        }
    };

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!("Quality monitoring disabled: {}", e);
            return MonitorHandle::inert();
        }
    };

    let signal = Arc::new(StopSignal::default());
    let task = runtime.spawn(run_monitor(
        config,
        connection,
        Arc::clone(&signal),
        on_sample,
    ));

    tracing::info!(
        "Quality monitor started (first sample after {}ms, then every {}ms)",
        config.initial_delay_ms,
        config.interval().as_millis()
    );

    MonitorHandle {
        signal: Some(signal),
        task: Some(task),
    }
}

// ============================================================================
// MONITOR TASK
// ============================================================================

/// Ticks laufen nacheinander in diesem Task und überlappen sich nie
async fn run_monitor<F>(
    config: MonitorConfig,
    connection: Arc<dyn StatsProvider>,
    signal: Arc<StopSignal>,
    mut on_sample: F,
) where
    F: FnMut(QualitySample),
{
    let start = Instant::now();
    let mut sampler = Sampler::new();

    // Frühes Sample, ohne eine volle Periode abzuwarten
    tokio::select! {
        _ = tokio::time::sleep_until(start + config.initial_delay()) => {}
        _ = signal.notify.notified() => {}
    }
    if !signal.is_stopped()
        && !run_tick(connection.as_ref(), &mut sampler, &signal, &mut on_sample).await
    {
        return;
    }

    let mut interval = tokio::time::interval_at(start + config.interval(), config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !signal.is_stopped() {
        tokio::select! {
            _ = interval.tick() => {}
            _ = signal.notify.notified() => continue,
        }
        if !run_tick(connection.as_ref(), &mut sampler, &signal, &mut on_sample).await {
            return;
        }
    }

    tracing::debug!("Quality monitor task finished");
}

/// `false` wenn die Verbindung geschlossen ist und keine Ticks mehr folgen
async fn run_tick<F>(
    connection: &dyn StatsProvider,
    sampler: &mut Sampler,
    signal: &StopSignal,
    on_sample: &mut F,
) -> bool
where
    F: FnMut(QualitySample),
{
    match sample_once(connection, sampler, signal).await {
        Ok(Some(sample)) => {
            tracing::debug!(
                "Quality sample: score {}, {} kbps, loss {:.3}",
                sample.quality,
                sample.bitrate_kbps,
                sample.packet_loss
            );
            on_sample(sample);
        }
        Ok(None) => tracing::debug!("Discarding quality sample after stop"),
        Err(StatsError::ConnectionClosed) => {
            tracing::info!("Connection closed, quality monitor finished");
            return false;
        }
        Err(e) => tracing::debug!("Skipping quality sample: {}", e),
    }
    true
}

/// Ein Tick: Abfrage, Stop-Prüfung, Berechnung
///
/// `Ok(None)` wenn der Monitor vor oder während der Abfrage gestoppt wurde.
/// Bei einem Fehler bleibt der Sampler unverändert.
async fn sample_once(
    connection: &dyn StatsProvider,
    sampler: &mut Sampler,
    signal: &StopSignal,
) -> Result<Option<QualitySample>, StatsError> {
    if signal.is_stopped() {
        return Ok(None);
    }

    let records = connection.query_stats().await?;

    if signal.is_stopped() {
        return Ok(None);
    }

    let snapshot = StatsSnapshot::from_records(&records);
    Ok(Some(sampler.ingest(&snapshot, Instant::now())))
}

// ============================================================================
// TESTS
// ============================================================================
