//! Quality Score
//!
//! Bildet Paketverlust und Durchsatz auf eine grobe Note von 1 (schlecht)
//! bis 5 (sehr gut) ab.

use serde::Serialize;
use std::fmt;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// (max. Verlust, min. kbps, Note), vom schlechtesten zum besten Fall
///
/// Eine Stufe greift bei `loss > max` oder `kbps < min`.
const TIERS: [(f64, u64, u8); 4] = [(0.10, 16, 1), (0.05, 32, 2), (0.02, 64, 3), (0.01, 96, 4)];

// ============================================================================
// QUALITY SCORE
// ============================================================================

/// Note von 1 bis 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QualityScore(u8);

impl QualityScore {
    pub const WORST: QualityScore = QualityScore(1);
    pub const BEST: QualityScore = QualityScore(5);

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

/// Bewertet Verlustrate und Durchsatz, die erste passende Stufe gewinnt
pub fn score_quality(loss: f64, kbps: u64) -> QualityScore {
    TIERS
        .iter()
        .find(|(max_loss, min_kbps, _)| loss > *max_loss || kbps < *min_kbps)
        .map(|(_, _, score)| QualityScore(*score))
        .unwrap_or(QualityScore::BEST)
}

// ============================================================================
// QUALITY SAMPLE
// ============================================================================

/// Ein Messpunkt des Quality Monitors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySample {
    pub quality: QualityScore,
    pub bitrate_kbps: u64,
    pub packet_loss: f64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        assert_eq!(score_quality(0.0, 100).value(), 5);
        assert_eq!(score_quality(0.0, 96).value(), 5);
        assert_eq!(score_quality(0.0, 95).value(), 4);
        assert_eq!(score_quality(0.015, 200).value(), 4);
        assert_eq!(score_quality(0.03, 200).value(), 3);
        assert_eq!(score_quality(0.0, 40).value(), 3);
        assert_eq!(score_quality(0.06, 200).value(), 2);
        assert_eq!(score_quality(0.0, 20).value(), 2);
        assert_eq!(score_quality(0.0, 0).value(), 1);
    }

    #[test]
    fn test_boundaries_are_strict() {
        // loss == 0.10 löst Stufe 1 nicht aus
        assert_eq!(score_quality(0.10, 200).value(), 2);
        // kbps == 16 löst Stufe 1 nicht aus
        assert_eq!(score_quality(0.0, 16).value(), 2);
        assert_eq!(score_quality(0.01, 96).value(), 5);
    }

    #[test]
    fn test_high_loss_is_worst_regardless_of_bitrate() {
        for kbps in [0, 16, 100, 10_000, u64::MAX] {
            assert_eq!(score_quality(0.12, kbps), QualityScore::WORST);
        }
    }

    #[test]
    fn test_monotonic() {
        let losses: Vec<f64> = (0..=40).map(|i| i as f64 * 0.005).collect();
        let rates: Vec<u64> = (0..=30).map(|i| i * 5).collect();

        for &kbps in &rates {
            for pair in losses.windows(2) {
                assert!(score_quality(pair[1], kbps) <= score_quality(pair[0], kbps));
            }
        }
        for &loss in &losses {
            for pair in rates.windows(2) {
                assert!(score_quality(loss, pair[1]) >= score_quality(loss, pair[0]));
            }
        }
    }

    #[test]
    fn test_sample_serialization() {
        let sample = QualitySample {
            quality: score_quality(0.0, 100),
            bitrate_kbps: 100,
            packet_loss: 0.0,
        };
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["quality"], 5);
        assert_eq!(json["bitrateKbps"], 100);
    }
}
