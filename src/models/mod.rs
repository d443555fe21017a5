pub mod log_record;
pub mod report;
pub mod traffic;
pub mod verdict;

pub use log_record::{EventType, LogRecord, Severity};
pub use report::{
    Insight, IpCount, Priority, Recommendation, ReportSummary, SeverityCounts, Timeframe,
};
pub use traffic::{RiskAssessment, RiskLevel, ScoredObservation, TrafficObservation};
pub use verdict::{AnomalyVerdict, VerdictSeverity, ALERT_RISK_THRESHOLD};
