//! Multi-format log line parser
//!
//! Turns raw uploaded bytes into normalized [`LogRecord`]s. Each non-blank
//! line is offered to a fixed, ordered list of matchers; the first one that
//! matches wins. Lines no matcher recognises still produce a record, so the
//! output always has exactly one record per non-blank input line.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::timestamp;
use crate::models::{EventType, LogRecord, Severity};

/// Line shapes the parser recognises, in matching priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `ip - - [timestamp] "method path" status size "referer" "agent"`
    AccessLog,
    /// `Mon dd hh:mm:ss host process: message`
    Syslog,
    /// `yyyy-mm-dd hh:mm:ss [LEVEL] message from ip`
    NetworkEvent,
    /// `yyyy-mm-dd hh:mm:ss LEVEL action message`
    Firewall,
}

static MATCHERS: Lazy<Vec<(LineFormat, Regex)>> = Lazy::new(|| {
    let build = |pattern: &str| Regex::new(pattern).expect("log line pattern must compile");
    vec![
        (
            LineFormat::AccessLog,
            build(r#"^(\S+) \S+ \S+ \[([^\]]+)\] "(\S+) ([^"]*)" ([0-9]+) ([0-9]+|-) "([^"]*)" "([^"]*)""#),
        ),
        (
            LineFormat::Syslog,
            build(r"^(\w+\s+[0-9]+\s+[0-9]+:[0-9]+:[0-9]+) (\S+) (\S+): (.*)"),
        ),
        (
            LineFormat::NetworkEvent,
            build(r"^([0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}) \[(\w+)\] (.+) from ([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)"),
        ),
        (
            LineFormat::Firewall,
            build(r"^([0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}) (\w+) (\w+) (.+)"),
        ),
    ]
});

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})\b").expect("ipv4 pattern must compile")
});

/// Parses uploaded log content into normalized records
#[derive(Debug, Clone, Default)]
pub struct LogRecordParser;

impl LogRecordParser {
    pub fn new() -> Self {
        LogRecordParser
    }

    /// Parse raw content from `source_file`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Blank lines are skipped;
    /// every other line yields exactly one record, in input order.
    pub fn parse(&self, raw: &[u8], source_file: &str) -> Vec<LogRecord> {
        let content = String::from_utf8_lossy(raw);
        let ingested_at = Utc::now();

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| self.parse_line_at(line, source_file, idx + 1, ingested_at))
            .collect()
    }

    /// Parse a single line, using the current time as the fallback timestamp
    pub fn parse_line(&self, line: &str, source_file: &str, line_number: usize) -> LogRecord {
        self.parse_line_at(line, source_file, line_number, Utc::now())
    }

    /// Identify which matcher, if any, accepts `line`
    pub fn detect_format(&self, line: &str) -> Option<LineFormat> {
        let trimmed = line.trim();
        MATCHERS
            .iter()
            .find(|(_, re)| re.is_match(trimmed))
            .map(|(format, _)| *format)
    }

    fn parse_line_at(
        &self,
        line: &str,
        source_file: &str,
        line_number: usize,
        ingested_at: DateTime<Utc>,
    ) -> LogRecord {
        let trimmed = line.trim();

        for (format, re) in MATCHERS.iter() {
            if let Some(caps) = re.captures(trimmed) {
                return Self::extract(*format, &caps, line, source_file, line_number, ingested_at);
            }
        }

        log::debug!(
            "{}:{} matched no known format, keeping as unknown event",
            source_file,
            line_number
        );

        LogRecord {
            timestamp: ingested_at,
            message: trimmed.to_string(),
            severity: Severity::Info,
            source_ip: None,
            event_type: EventType::Unknown,
            source_file: source_file.to_string(),
            line_number,
            raw_log: line.to_string(),
        }
    }

    fn extract(
        format: LineFormat,
        caps: &Captures<'_>,
        line: &str,
        source_file: &str,
        line_number: usize,
        ingested_at: DateTime<Utc>,
    ) -> LogRecord {
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");

        let (timestamp, message, severity, source_ip, event_type) = match format {
            LineFormat::AccessLog => {
                // Only overflow can fail here; treat it as the largest status
                let status = group(5).parse::<u64>().unwrap_or(u64::MAX);
                let severity = Severity::from_http_status(status);
                (
                    timestamp::parse_or(group(2), ingested_at),
                    format!("{} {}", group(3), group(4)),
                    severity,
                    Some(group(1).to_string()),
                    EventType::HttpRequest,
                )
            }
            LineFormat::NetworkEvent => (
                timestamp::parse_or(group(1), ingested_at),
                group(3).to_string(),
                Severity::from_level(group(2)),
                Some(group(4).to_string()),
                EventType::NetworkEvent,
            ),
            LineFormat::Syslog | LineFormat::Firewall => {
                let message = group(4).to_string();
                let source_ip = first_ipv4(&message);
                (
                    timestamp::parse_or(group(1), ingested_at),
                    message,
                    Severity::Info,
                    source_ip,
                    EventType::SystemEvent,
                )
            }
        };

        LogRecord {
            timestamp,
            message,
            severity,
            source_ip,
            event_type,
            source_file: source_file.to_string(),
            line_number,
            raw_log: line.to_string(),
        }
    }
}

fn first_ipv4(text: &str) -> Option<String> {
    IPV4.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ACCESS_LINE: &str = r#"192.168.1.5 - - [10/Oct/2024:13:55:36 -0700] "GET /login HTTP/1.1" 401 512 "-" "curl/7.68""#;

    #[test]
    fn test_access_log_line() {
        let parser = LogRecordParser::new();
        let record = parser.parse_line(ACCESS_LINE, "access.log", 1);

        assert_eq!(record.source_ip.as_deref(), Some("192.168.1.5"));
        assert_eq!(record.event_type, EventType::HttpRequest);
        assert_eq!(record.severity, Severity::Warning);
        assert_eq!(record.message, "GET /login HTTP/1.1");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 10, 10, 20, 55, 36).unwrap()
        );
        assert_eq!(record.raw_log, ACCESS_LINE);
    }

    #[test]
    fn test_access_log_server_error_is_danger() {
        let line = r#"10.0.0.9 - admin [01/Jan/2024:00:00:01 +0000] "POST /api HTTP/2" 503 - "-" "Mozilla/5.0""#;
        let record = LogRecordParser::new().parse_line(line, "access.log", 3);
        assert_eq!(record.severity, Severity::Danger);
        assert_eq!(record.line_number, 3);
    }

    #[test]
    fn test_oversized_status_is_danger() {
        let parser = LogRecordParser::new();
        for status in ["70000", "99999999999999999999999"] {
            let line = format!(
                r#"10.0.0.9 - - [01/Jan/2024:00:00:01 +0000] "GET / HTTP/1.1" {} 10 "-" "curl""#,
                status
            );
            let record = parser.parse_line(&line, "access.log", 1);
            assert_eq!(record.event_type, EventType::HttpRequest);
            assert_eq!(record.severity, Severity::Danger, "status {}", status);
        }
    }

    #[test]
    fn test_non_ascii_digits_are_not_dates() {
        let line = "٢٠٢٤-01-02 10:11:12 [ERROR] breach from 10.0.0.1";
        let record = LogRecordParser::new().parse_line(line, "net.log", 1);
        assert_eq!(record.event_type, EventType::Unknown);
    }

    #[test]
    fn test_syslog_line() {
        let line = "Oct 11 22:14:15 gateway sshd[4123]: Accepted publickey for alice from 203.0.113.7 port 5022";
        let record = LogRecordParser::new().parse_line(line, "auth.log", 1);

        assert_eq!(record.event_type, EventType::SystemEvent);
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(
            record.message,
            "Accepted publickey for alice from 203.0.113.7 port 5022"
        );
        assert_eq!(record.source_ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_network_event_line() {
        let line = "2024-05-02 10:11:12 [WARN] Port scan detected from 198.51.100.23";
        let record = LogRecordParser::new().parse_line(line, "net.log", 1);

        assert_eq!(record.event_type, EventType::NetworkEvent);
        assert_eq!(record.severity, Severity::Warning);
        assert_eq!(record.message, "Port scan detected");
        assert_eq!(record.source_ip.as_deref(), Some("198.51.100.23"));
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 2, 10, 11, 12).unwrap()
        );
    }

    #[test]
    fn test_firewall_line() {
        let line = "2024-05-02 10:11:12 INFO ACCEPT TCP 10.1.1.1:443 -> 10.1.1.2:5555";
        let parser = LogRecordParser::new();
        assert_eq!(parser.detect_format(line), Some(LineFormat::Firewall));

        let record = parser.parse_line(line, "fw.log", 1);
        assert_eq!(record.event_type, EventType::SystemEvent);
        assert_eq!(record.message, "TCP 10.1.1.1:443 -> 10.1.1.2:5555");
        assert_eq!(record.source_ip.as_deref(), Some("10.1.1.1"));
    }

    #[test]
    fn test_network_event_level_sets_starting_severity() {
        let line = "2024-05-02 10:11:12 [ERROR] blocked connection from 10.0.0.4";
        let parser = LogRecordParser::new();
        assert_eq!(parser.detect_format(line), Some(LineFormat::NetworkEvent));
        assert_eq!(parser.parse_line(line, "x", 1).severity, Severity::Danger);
    }

    #[test]
    fn test_unmatched_line_falls_back() {
        let line = "Multiple failed login attempts detected";
        let record = LogRecordParser::new().parse_line(line, "misc.txt", 7);

        assert_eq!(record.message, line);
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(record.event_type, EventType::Unknown);
        assert!(record.source_ip.is_none());
        assert_eq!(record.line_number, 7);
    }

    #[test]
    fn test_one_record_per_non_blank_line() {
        let content = format!(
            "{}\n\n   \nrandom text\n\t\n2024-05-02 10:11:12 INFO DROP x\r\nlast line",
            ACCESS_LINE
        );
        let records = LogRecordParser::new().parse(content.as_bytes(), "mixed.log");

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].event_type, EventType::HttpRequest);
        assert_eq!(records[1].message, "random text");
        assert_eq!(records[1].line_number, 4);
        assert_eq!(records[2].event_type, EventType::SystemEvent);
        assert_eq!(records[3].message, "last line");
        assert_eq!(records[3].line_number, 7);
    }

    #[test]
    fn test_invalid_utf8_is_not_dropped() {
        let mut content = b"first line\n".to_vec();
        content.extend_from_slice(&[0xff, 0xfe, b'o', b'k']);
        let records = LogRecordParser::new().parse(&content, "bin.log");
        assert_eq!(records.len(), 2);
        assert!(records[1].message.ends_with("ok"));
    }

    #[test]
    fn test_unparseable_timestamp_uses_ingestion_time() {
        let line = r#"1.2.3.4 - - [not-a-date] "GET / HTTP/1.1" 200 10 "-" "-""#;
        let before = Utc::now();
        let record = LogRecordParser::new().parse_line(line, "access.log", 1);
        assert_eq!(record.event_type, EventType::HttpRequest);
        assert!(record.timestamp >= before);
    }
}
