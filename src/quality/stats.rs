//! Transport-Statistiken
//!
//! Abstraktion über die Stats-Abfrage einer Peer Connection. Aus den
//! Reports werden nur die Zähler gebraucht, die für Durchsatz und
//! Paketverlust nötig sind.

use futures::future::BoxFuture;
use thiserror::Error;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::{StatsReport, StatsReportType};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("Stats query failed: {0}")]
    QueryFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

// ============================================================================
// RECORDS
// ============================================================================

/// Typ eines Stats-Reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// `outbound-rtp`
    OutboundRtp,
    /// `remote-inbound-rtp`
    RemoteInboundRtp,
    Other,
}

impl ReportKind {
    /// Ordnet den `type`-String eines Reports zu
    pub fn from_type(report_type: &str) -> Self {
        match report_type {
            "outbound-rtp" => ReportKind::OutboundRtp,
            "remote-inbound-rtp" => ReportKind::RemoteInboundRtp,
            _ => ReportKind::Other,
        }
    }
}

/// Ein einzelner Report mit den relevanten Zählern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsRecord {
    pub kind: ReportKind,
    /// Ältere Implementierungen markieren entfernte Outbound-Reports so
    pub is_remote: bool,
    pub bytes_sent: u64,
    pub packets_lost: u64,
    pub packets_received: u64,
}

impl StatsRecord {
    pub fn outbound(bytes_sent: u64) -> Self {
        Self {
            kind: ReportKind::OutboundRtp,
            is_remote: false,
            bytes_sent,
            packets_lost: 0,
            packets_received: 0,
        }
    }

    pub fn remote_inbound(packets_lost: u64, packets_received: u64) -> Self {
        Self {
            kind: ReportKind::RemoteInboundRtp,
            is_remote: true,
            bytes_sent: 0,
            packets_lost,
            packets_received,
        }
    }
}

/// Über alle Reports summierte Zähler eines Zeitpunkts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub packets_lost: u64,
    pub packets_received: u64,
}

impl StatsSnapshot {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a StatsRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            match record.kind {
                ReportKind::OutboundRtp if !record.is_remote => {
                    snapshot.bytes_sent = snapshot.bytes_sent.saturating_add(record.bytes_sent);
                }
                ReportKind::RemoteInboundRtp => {
                    snapshot.packets_lost =
                        snapshot.packets_lost.saturating_add(record.packets_lost);
                    snapshot.packets_received = snapshot
                        .packets_received
                        .saturating_add(record.packets_received);
                }
                _ => {}
            }
        }
        snapshot
    }

    pub fn packets_total(&self) -> u64 {
        self.packets_received.saturating_add(self.packets_lost)
    }

    /// Verlustrate in [0, 1], 0 ohne Pakete
    pub fn loss_ratio(&self) -> f64 {
        let total = self.packets_total();
        if total > 0 {
            self.packets_lost as f64 / total as f64
        } else {
            0.0
        }
    }
}

// ============================================================================
// STATS PROVIDER
// ============================================================================

/// Verbindung, deren Transport-Statistiken abgefragt werden können
pub trait StatsProvider: Send + Sync {
    /// Fragt die aktuellen Reports ab
    fn query_stats(&self) -> BoxFuture<'_, Result<Vec<StatsRecord>, StatsError>>;

    /// `false`, wenn die Verbindung keine Stats-Abfrage anbietet
    fn supports_stats(&self) -> bool {
        true
    }
}

impl StatsProvider for RTCPeerConnection {
    fn query_stats(&self) -> BoxFuture<'_, Result<Vec<StatsRecord>, StatsError>> {
        Box::pin(async move {
            if self.connection_state() == RTCPeerConnectionState::Closed {
                return Err(StatsError::ConnectionClosed);
            }
            let report = self.get_stats().await;
            Ok(records_from_report(&report))
        })
    }
}

/// Wandelt einen webrtc-rs Report in `StatsRecord`s um
pub fn records_from_report(report: &StatsReport) -> Vec<StatsRecord> {
    report
        .reports
        .values()
        .filter_map(|entry| match entry {
            StatsReportType::OutboundRTP(outbound) => {
                Some(StatsRecord::outbound(outbound.bytes_sent))
            }
            // packets_lost ist vorzeichenbehaftet (Duplikate)
            StatsReportType::RemoteInboundRTP(remote) => Some(StatsRecord::remote_inbound(
                remote.packets_lost.max(0) as u64,
                remote.packets_received as u64,
            )),
            _ => None,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
