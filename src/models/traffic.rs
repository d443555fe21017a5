use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::input::timestamp;

/// One captured or simulated packet/flow summary.
///
/// The capture script emits ports and lengths as strings or numbers
/// depending on where the data came from, so deserialization is lenient:
/// anything that does not parse becomes `None` (ports) or `0` (length).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficObservation {
    #[serde(default)]
    pub source_ip: String,
    #[serde(default)]
    pub destination_ip: String,
    #[serde(default, deserialize_with = "lenient_port")]
    pub source_port: Option<u16>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub destination_port: Option<u16>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, deserialize_with = "lenient_length")]
    pub packet_length: u32,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl TrafficObservation {
    pub fn new(source_ip: &str, destination_ip: &str, protocol: &str) -> Self {
        TrafficObservation {
            source_ip: source_ip.to_string(),
            destination_ip: destination_ip.to_string(),
            source_port: None,
            destination_port: None,
            protocol: protocol.to_string(),
            packet_length: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_ports(mut self, source_port: Option<u16>, destination_port: Option<u16>) -> Self {
        self.source_port = source_port;
        self.destination_port = destination_port;
        self
    }

    pub fn with_length(mut self, packet_length: u32) -> Self {
        self.packet_length = packet_length;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_length<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .and_then(|s| timestamp::parse_timestamp(&s))
        .unwrap_or_else(Utc::now))
}

/// Coarse risk bucket for an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Result of scoring one observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

/// An observation together with the risk computed for it at ingestion.
///
/// The assessment is fixed at construction; there is no way to re-score
/// an entry once it sits in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredObservation {
    #[serde(flatten)]
    observation: TrafficObservation,
    risk: RiskAssessment,
}

impl ScoredObservation {
    pub(crate) fn new(observation: TrafficObservation, risk: RiskAssessment) -> Self {
        ScoredObservation { observation, risk }
    }

    pub fn observation(&self) -> &TrafficObservation {
        &self.observation
    }

    pub fn risk(&self) -> &RiskAssessment {
        &self.risk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_capture_script_row() {
        let json = r#"{
            "source_ip": "192.168.1.20",
            "destination_ip": "8.8.8.8",
            "protocol": "TCP",
            "source_port": "51234",
            "destination_port": "443",
            "packet_length": 0,
            "state": "ESTABLISHED",
            "timestamp": "2024-10-10T13:55:36.123456",
            "connection_type": "active"
        }"#;
        let obs: TrafficObservation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.source_port, Some(51234));
        assert_eq!(obs.destination_port, Some(443));
        assert_eq!(obs.protocol, "TCP");
        assert_eq!(obs.timestamp.to_rfc3339(), "2024-10-10T13:55:36.123456+00:00");
    }

    #[test]
    fn test_deserialize_tolerates_garbage_fields() {
        let json = r#"{"source_ip": "10.0.0.1", "source_port": "*", "destination_port": 70000,
                       "packet_length": "big", "timestamp": "yesterday-ish"}"#;
        let obs: TrafficObservation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.source_port, None);
        assert_eq!(obs.destination_port, None);
        assert_eq!(obs.packet_length, 0);
        assert!(obs.destination_ip.is_empty());
    }

    #[test]
    fn test_numeric_length_and_ports() {
        let json = r#"{"source_port": 22, "destination_port": null, "packet_length": "1600"}"#;
        let obs: TrafficObservation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.source_port, Some(22));
        assert_eq!(obs.destination_port, None);
        assert_eq!(obs.packet_length, 1600);
    }
}
