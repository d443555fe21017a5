use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk score at or above which a verdict is surfaced as an alert
pub const ALERT_RISK_THRESHOLD: u8 = 6;

/// Overall security status reported by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VerdictSeverity {
    Normal,
    Warning,
    Critical,
}

impl VerdictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictSeverity::Normal => "Normal",
            VerdictSeverity::Warning => "Warning",
            VerdictSeverity::Critical => "Critical",
        }
    }
}

impl fmt::Display for VerdictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerdictSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(VerdictSeverity::Normal),
            "Warning" => Ok(VerdictSeverity::Warning),
            "Critical" => Ok(VerdictSeverity::Critical),
            other => Err(format!("unknown verdict severity '{}'", other)),
        }
    }
}

/// One periodic anomaly analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub timestamp: DateTime<Utc>,
    pub severity: VerdictSeverity,
    /// Always within 1..=10
    pub risk_score: u8,
    pub raw_analysis_text: String,
    pub anomalies: Vec<String>,
    pub recommendations: Vec<String>,
    /// Observations in the analysed snapshot whose risk level was not low
    pub affected_observation_count: usize,
    /// Model that produced `raw_analysis_text`
    pub model_id: String,
}

impl AnomalyVerdict {
    /// Whether this verdict should be surfaced to the user and counted as an anomaly
    pub fn is_alert_worthy(&self) -> bool {
        self.risk_score >= ALERT_RISK_THRESHOLD || self.severity != VerdictSeverity::Normal
    }
}
