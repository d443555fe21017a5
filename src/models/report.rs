use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lookback window for a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "24h")]
    Day,
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Timeframe {
    /// Parse a timeframe label. Unrecognized labels fall back to seven days.
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "24h" => Timeframe::Day,
            "7d" => Timeframe::Week,
            "30d" => Timeframe::Month,
            _ => Timeframe::Week,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
        }
    }

    pub fn lookback(&self) -> Duration {
        match self {
            Timeframe::Day => Duration::hours(24),
            Timeframe::Week => Duration::days(7),
            Timeframe::Month => Duration::days(30),
        }
    }

    /// Start of the window ending at `now`
    pub fn start_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.lookback()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// A finding extracted from a model analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub description: String,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
}

/// An action suggested by a model analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub action: String,
    pub priority: Priority,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Record counts split by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub danger: usize,
}

/// One row of the source-IP frequency table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpCount {
    pub ip: String,
    pub count: usize,
}

/// Aggregate statistics backing a generated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub timeframe: Timeframe,
    pub total_logs: usize,
    pub severity_counts: SeverityCounts,
    pub unique_source_ips: usize,
    /// At most ten entries, most frequent first
    pub top_source_ips: Vec<IpCount>,
    pub total_insights: usize,
    pub high_confidence_insights: usize,
    pub total_recommendations: usize,
    pub high_priority_recommendations: usize,
}
