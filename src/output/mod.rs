use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{AnomalyVerdict, LogRecord, ReportSummary};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "jsonl" => Some(OutputFormat::Jsonl),
            "console" => Some(OutputFormat::Console),
            _ => None,
        }
    }
}

/// Human-readable single-item rendering used by the console format
pub trait ConsoleRender {
    fn render_console(&self) -> String;
}

impl ConsoleRender for AnomalyVerdict {
    fn render_console(&self) -> String {
        let mut out = format!(
            "[{}] {} risk {}/10 ({}, {} affected observations)\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.severity,
            self.risk_score,
            self.model_id,
            self.affected_observation_count
        );
        for line in &self.anomalies {
            out.push_str(&format!("  ! {}\n", line.trim()));
        }
        for line in &self.recommendations {
            out.push_str(&format!("  > {}\n", line.trim()));
        }
        out
    }
}

impl ConsoleRender for ReportSummary {
    fn render_console(&self) -> String {
        let mut out = format!(
            "Report ({})\n  Logs: {} (info {}, warning {}, danger {})\n  Unique source IPs: {}\n",
            self.timeframe,
            self.total_logs,
            self.severity_counts.info,
            self.severity_counts.warning,
            self.severity_counts.danger,
            self.unique_source_ips
        );
        if !self.top_source_ips.is_empty() {
            out.push_str("  Top source IPs:\n");
            for entry in &self.top_source_ips {
                out.push_str(&format!("    {:<40} {}\n", entry.ip, entry.count));
            }
        }
        out.push_str(&format!(
            "  Insights: {} ({} high confidence)\n  Recommendations: {} ({} high priority)\n",
            self.total_insights,
            self.high_confidence_insights,
            self.total_recommendations,
            self.high_priority_recommendations
        ));
        out
    }
}

impl ConsoleRender for LogRecord {
    fn render_console(&self) -> String {
        format!(
            "{}:{} [{}] {} {} {}\n",
            self.source_file,
            self.line_number,
            self.severity,
            self.event_type,
            self.source_ip.as_deref().unwrap_or("-"),
            self.message
        )
    }
}

/// Writes verdicts, records and reports to stdout or a file
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

impl OutputHandler {
    /// Create a new output handler; without a file path output goes to stdout
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, OutputError> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(OutputHandler { format, writer })
    }

    /// Write one item in the configured format
    pub fn write<T: Serialize + ConsoleRender>(&mut self, item: &T) -> Result<(), OutputError> {
        let data = match self.format {
            OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(item)?),
            OutputFormat::Jsonl => format!("{}\n", serde_json::to_string(item)?),
            OutputFormat::Console => item.render_console(),
        };
        self.write_output(&data)
    }

    fn write_output(&mut self, data: &str) -> Result<(), OutputError> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(data.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), OutputError> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IpCount, SeverityCounts, Timeframe, VerdictSeverity};
    use chrono::Utc;

    fn verdict() -> AnomalyVerdict {
        AnomalyVerdict {
            timestamp: Utc::now(),
            severity: VerdictSeverity::Critical,
            risk_score: 9,
            raw_analysis_text: "RISK SCORE: 9".to_string(),
            anomalies: vec!["ANOMALIES: scan ".to_string()],
            recommendations: vec!["RECOMMEND: block".to_string()],
            affected_observation_count: 4,
            model_id: "granite33".to_string(),
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("JSONL"), Some(OutputFormat::Jsonl));
        assert_eq!(OutputFormat::parse("console"), Some(OutputFormat::Console));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_jsonl_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdicts.jsonl");

        let mut handler = OutputHandler::new(OutputFormat::Jsonl, Some(path.clone())).unwrap();
        handler.write(&verdict()).unwrap();
        handler.write(&verdict()).unwrap();
        handler.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AnomalyVerdict = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.risk_score, 9);
    }

    #[test]
    fn test_console_rendering() {
        let text = verdict().render_console();
        assert!(text.contains("Critical risk 9/10"));
        assert!(text.contains("  ! ANOMALIES: scan\n"));
        assert!(text.contains("  > RECOMMEND: block\n"));

        let summary = ReportSummary {
            timeframe: Timeframe::Day,
            total_logs: 3,
            severity_counts: SeverityCounts { info: 1, warning: 1, danger: 1 },
            unique_source_ips: 1,
            top_source_ips: vec![IpCount { ip: "10.0.0.1".to_string(), count: 3 }],
            total_insights: 0,
            high_confidence_insights: 0,
            total_recommendations: 0,
            high_priority_recommendations: 0,
        };
        let text = summary.render_console();
        assert!(text.starts_with("Report (24h)"));
        assert!(text.contains("10.0.0.1"));
    }
}
