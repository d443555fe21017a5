//! Turns free-form model output into an [`AnomalyVerdict`]
//!
//! Models are asked to answer in a loose line-oriented layout (status, anomalies,
//! recommendations, risk score) but nothing guarantees they comply. Extraction
//! is a best-effort line scan; missing markers leave fields at their defaults.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::window::WindowStats;
use crate::models::{AnomalyVerdict, RiskLevel, ScoredObservation, VerdictSeverity};

/// Risk score used when the model gives none, or one outside 1..=10
pub const DEFAULT_RISK_SCORE: u8 = 1;

static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+").expect("integer pattern must compile"));

/// Builds verdicts from model responses
#[derive(Debug, Clone, Default)]
pub struct AnomalyReportBuilder {
    model_id: String,
}

impl AnomalyReportBuilder {
    /// Create a builder that tags verdicts with `model_id`
    pub fn new(model_id: &str) -> Self {
        AnomalyReportBuilder {
            model_id: model_id.to_string(),
        }
    }

    /// Build a verdict for `snapshot` from the model's text response
    pub fn build(&self, snapshot: &[ScoredObservation], model_text: &str) -> AnomalyVerdict {
        let mut severity = VerdictSeverity::Normal;
        let mut risk_score = DEFAULT_RISK_SCORE;
        let mut anomalies = Vec::new();
        let mut recommendations = Vec::new();

        for line in model_text.lines() {
            let upper = line.to_uppercase();

            if upper.contains("SECURITY STATUS") || upper.contains("STATUS:") {
                if upper.contains("CRITICAL") {
                    severity = VerdictSeverity::Critical;
                } else if upper.contains("WARNING") {
                    severity = VerdictSeverity::Warning;
                }
            }

            if upper.contains("RISK SCORE") {
                if let Some(score) = first_integer(line) {
                    if (1..=10).contains(&score) {
                        risk_score = score as u8;
                    }
                }
            }

            if upper.contains("ANOMALIES") || upper.contains("SUSPICIOUS") {
                anomalies.push(line.to_string());
            }

            if upper.contains("RECOMMEND") {
                recommendations.push(line.to_string());
            }
        }

        let affected_observation_count = snapshot
            .iter()
            .filter(|entry| entry.risk().level != RiskLevel::Low)
            .count();

        AnomalyVerdict {
            timestamp: Utc::now(),
            severity,
            risk_score,
            raw_analysis_text: model_text.to_string(),
            anomalies,
            recommendations,
            affected_observation_count,
            model_id: self.model_id.clone(),
        }
    }
}

/// First run of digits on the line, if it fits in a u64
fn first_integer(line: &str) -> Option<u64> {
    FIRST_INTEGER
        .find(line)
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Render the analyst prompt for a traffic snapshot
pub fn build_traffic_prompt(stats: &WindowStats) -> String {
    let summary = serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string());

    format!(
        "You are an AI Network Security Analyst performing real-time network monitoring. \
Analyze the following network traffic data and detect any security anomalies, threats, \
or suspicious patterns:

NETWORK TRAFFIC SUMMARY:
{}

Please analyze this data and provide:
1. SECURITY STATUS: Normal/Warning/Critical
2. ANOMALIES DETECTED: List any suspicious patterns
3. THREAT ASSESSMENT: Assess potential security threats
4. RECOMMENDED ACTIONS: Immediate actions to take
5. RISK SCORE: Rate from 1-10 (10 being highest risk)

Focus on detecting:
- Unusual traffic patterns
- Suspicious IP addresses
- Port scanning attempts
- Potential malware communication
- Data exfiltration indicators
- DDoS attack patterns

Provide a concise security assessment.",
        summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::RiskScorer;
    use crate::models::TrafficObservation;

    fn snapshot() -> Vec<ScoredObservation> {
        let scorer = RiskScorer::new();
        vec![
            scorer.assess(TrafficObservation::new("10.0.0.1", "10.0.0.2", "TCP")),
            scorer.assess(
                TrafficObservation::new("8.8.8.8", "10.0.0.2", "TCP").with_ports(None, Some(22)),
            ),
            scorer.assess(
                TrafficObservation::new("8.8.8.8", "10.0.0.2", "TCP")
                    .with_ports(Some(445), Some(3389)),
            ),
        ]
    }

    #[test]
    fn test_well_formed_response() {
        let text = "\
SECURITY STATUS: Warning
ANOMALIES DETECTED: repeated RDP connections from 8.8.8.8
THREAT ASSESSMENT: moderate
RECOMMENDED ACTIONS: block 8.8.8.8 at the edge firewall
RISK SCORE: 7";
        let verdict = AnomalyReportBuilder::new("granite33").build(&snapshot(), text);

        assert_eq!(verdict.severity, VerdictSeverity::Warning);
        assert_eq!(verdict.risk_score, 7);
        assert_eq!(verdict.anomalies, vec!["ANOMALIES DETECTED: repeated RDP connections from 8.8.8.8"]);
        assert_eq!(verdict.recommendations.len(), 1);
        assert_eq!(verdict.affected_observation_count, 2);
        assert_eq!(verdict.model_id, "granite33");
        assert_eq!(verdict.raw_analysis_text, text);
        assert!(verdict.is_alert_worthy());
    }

    #[test]
    fn test_no_markers_gives_defaults() {
        let verdict = AnomalyReportBuilder::new("granite33")
            .build(&[], "Everything looks fine to me.\nHave a nice day.");

        assert_eq!(verdict.severity, VerdictSeverity::Normal);
        assert_eq!(verdict.risk_score, 1);
        assert!(verdict.anomalies.is_empty());
        assert!(verdict.recommendations.is_empty());
        assert!(!verdict.is_alert_worthy());
    }

    #[test]
    fn test_out_of_range_risk_score_is_ignored() {
        let builder = AnomalyReportBuilder::new("granite33");
        assert_eq!(builder.build(&[], "RISK SCORE: 15").risk_score, 1);
        assert_eq!(builder.build(&[], "RISK SCORE: 0").risk_score, 1);
        assert_eq!(
            builder.build(&[], "RISK SCORE: 99999999999999999999999999").risk_score,
            1
        );
        assert_eq!(builder.build(&[], "risk score is 10/10").risk_score, 10);
    }

    #[test]
    fn test_later_valid_score_wins() {
        let text = "RISK SCORE: 3\nsome text\nRISK SCORE: 8";
        assert_eq!(AnomalyReportBuilder::new("m").build(&[], text).risk_score, 8);
    }

    #[test]
    fn test_only_ascii_digits_count_as_score() {
        let builder = AnomalyReportBuilder::new("m");
        assert_eq!(builder.build(&[], "RISK SCORE: ٣ then 4").risk_score, 4);
        assert_eq!(builder.build(&[], "RISK SCORE: ٧").risk_score, 1);
    }

    #[test]
    fn test_status_markers() {
        let builder = AnomalyReportBuilder::new("m");
        assert_eq!(
            builder.build(&[], "Security Status: critical").severity,
            VerdictSeverity::Critical
        );
        assert_eq!(
            builder.build(&[], "STATUS: Normal").severity,
            VerdictSeverity::Normal
        );
        // Keywords without a status marker do not count
        assert_eq!(
            builder.build(&[], "CRITICAL failure in nothing").severity,
            VerdictSeverity::Normal
        );
    }

    #[test]
    fn test_suspicious_lines_collected() {
        let text = "Suspicious port scan from 1.2.3.4\nI recommend isolating the host";
        let verdict = AnomalyReportBuilder::new("m").build(&[], text);
        assert_eq!(verdict.anomalies, vec!["Suspicious port scan from 1.2.3.4"]);
        assert_eq!(verdict.recommendations, vec!["I recommend isolating the host"]);
    }

    #[test]
    fn test_never_panics_on_odd_input() {
        let builder = AnomalyReportBuilder::new("m");
        let bytes: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let lossy = String::from_utf8_lossy(&bytes).to_string();
        let inputs = [
            String::new(),
            "\n\n\n".to_string(),
            "RISK SCORE".to_string(),
            "ǅ RISK SCORE: ½ ٣ 4".to_string(),
            "ß".repeat(1000),
            lossy,
        ];
        for input in inputs.iter() {
            let verdict = builder.build(&snapshot(), input);
            assert!((1..=10).contains(&verdict.risk_score));
        }
    }

    #[test]
    fn test_prompt_contains_summary_and_markers() {
        let stats = WindowStats::from_entries(snapshot().iter());
        let prompt = build_traffic_prompt(&stats);
        assert!(prompt.contains("\"observation_count\": 3"));
        assert!(prompt.contains("RISK SCORE"));
        assert!(prompt.contains("SECURITY STATUS"));
    }
}
