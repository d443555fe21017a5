pub mod alerting;
pub mod analysis;
pub mod config;
pub mod detection;
pub mod inference;
pub mod input;
pub mod models;
pub mod monitoring;
pub mod output;
pub mod persistence;
pub mod pipeline;
pub mod report;

// Re-export commonly used types
pub use models::{AnomalyVerdict, LogRecord, ReportSummary, ScoredObservation, TrafficObservation};
pub use detection::{AnomalyReportBuilder, RiskScorer, SeverityClassifier, SlidingWindowAggregator};
pub use inference::{InferenceClient, ScriptInference, WatsonxClient};
pub use persistence::{LogStore, SqliteLogStore};
pub use pipeline::IngestPipeline;
pub use analysis::BatchAnalyzer;
pub use monitoring::MonitoringSession;
pub use alerting::{AlertDispatcher, AlertQueue};
