//! Konfiguration für das Quality Monitoring
//!
//! Die Standardwerte können über Umgebungsvariablen überschrieben werden:
//! - `PULSE_QUALITY_INITIAL_DELAY_MS` (Standard: 1000)
//! - `PULSE_QUALITY_INTERVAL_MS` (Standard: 2000)

use serde::Deserialize;
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Verzögerung bis zum ersten Sample
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Abstand zwischen zwei regulären Samples
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

const INITIAL_DELAY_ENV: &str = "PULSE_QUALITY_INITIAL_DELAY_MS";
const INTERVAL_ENV: &str = "PULSE_QUALITY_INTERVAL_MS";

// ============================================================================
// MONITOR CONFIG
// ============================================================================

/// Timing des Quality Monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Millisekunden bis zum ersten (frühen) Sample
    pub initial_delay_ms: u64,
    /// Periode der regulären Samples in Millisekunden
    pub interval_ms: u64,
}

impl MonitorConfig {
    /// Liest die Konfiguration aus der Umgebung
    ///
    /// Fehlende oder ungültige Werte fallen auf die Standardwerte zurück.
    pub fn from_env() -> Self {
        Self {
            initial_delay_ms: read_env_ms(INITIAL_DELAY_ENV, DEFAULT_INITIAL_DELAY_MS),
            interval_ms: read_env_ms(INTERVAL_ENV, DEFAULT_INTERVAL_MS),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Periode, mindestens 1ms (tokio::time::interval erlaubt keine Null-Periode)
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

fn read_env_ms(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {}ms", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

// ============================================================================
// TESTS
// ============================================================================
