//! Per-observation risk scoring
//!
//! Accumulates a score from a handful of cheap signals and buckets it.
//! Not a substitute for a signature engine.

use crate::models::{RiskAssessment, RiskLevel, ScoredObservation, TrafficObservation};

/// Ports commonly targeted by remote access and lateral movement
pub const SUSPICIOUS_PORTS: [u16; 7] = [22, 23, 135, 139, 445, 3389, 5900];

/// Packets above this size draw extra scrutiny
pub const LARGE_PACKET_BYTES: u32 = 1500;

const HIGH_RISK_SCORE: u32 = 7;
const MEDIUM_RISK_SCORE: u32 = 4;

/// Address prefixes treated as internal.
///
/// Plain string prefixes, not CIDR ranges: `172.32.0.1` counts as internal.
const INTERNAL_PREFIXES: [&str; 3] = ["10.", "192.168.", "172."];

/// Stateless scorer for traffic observations
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        RiskScorer
    }

    /// Score one observation
    pub fn score(&self, observation: &TrafficObservation) -> RiskAssessment {
        let mut score = 0u32;
        let mut factors = Vec::new();

        if is_internal(&observation.source_ip) {
            score += 1;
        } else {
            score += 2;
        }

        if observation.source_port.is_some_and(is_suspicious_port) {
            score += 3;
            factors.push("Suspicious source port".to_string());
        }
        if observation.destination_port.is_some_and(is_suspicious_port) {
            score += 3;
            factors.push("Suspicious destination port".to_string());
        }

        if observation.packet_length > LARGE_PACKET_BYTES {
            score += 2;
            factors.push("Large packet size".to_string());
        }

        let level = if score >= HIGH_RISK_SCORE {
            RiskLevel::High
        } else if score >= MEDIUM_RISK_SCORE {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskAssessment { score, level, factors }
    }

    /// Score an observation and attach the result
    pub fn assess(&self, observation: TrafficObservation) -> ScoredObservation {
        let risk = self.score(&observation);
        ScoredObservation::new(observation, risk)
    }
}

pub fn is_suspicious_port(port: u16) -> bool {
    SUSPICIOUS_PORTS.contains(&port)
}

fn is_internal(ip: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|prefix| ip.starts_with(prefix))
}
