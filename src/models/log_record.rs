use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a normalized log record.
///
/// Ordered so that `Info < Warning < Danger`; classification only ever
/// moves a record up this ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }

    /// Starting severity for an HTTP status code
    pub fn from_http_status(status: u64) -> Self {
        if status >= 500 {
            Severity::Danger
        } else if status >= 400 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// Starting severity for a free-form level token such as `WARN` or `ERROR`
    pub fn from_level(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "danger" | "critical" | "crit" | "error" | "err" | "alert" | "emerg" | "fatal" => {
                Severity::Danger
            }
            "warning" | "warn" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "danger" => Ok(Severity::Danger),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Kind of event a log line describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    HttpRequest,
    NetworkEvent,
    SystemEvent,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::HttpRequest => "http_request",
            EventType::NetworkEvent => "network_event",
            EventType::SystemEvent => "system_event",
            EventType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_request" => Ok(EventType::HttpRequest),
            "network_event" => Ok(EventType::NetworkEvent),
            "system_event" => Ok(EventType::SystemEvent),
            "unknown" => Ok(EventType::Unknown),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// One normalized log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
    pub source_ip: Option<String>,
    pub event_type: EventType,
    /// Name of the file or stream the line came from
    pub source_file: String,
    /// 1-based line position within the source content
    pub line_number: usize,
    /// The original, unmodified line
    pub raw_log: String,
}
