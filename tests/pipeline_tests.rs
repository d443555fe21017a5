use chrono::{Duration, Utc};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use netsage::alerting::AlertDispatcher;
use netsage::analysis::BatchAnalyzer;
use netsage::config::{AlertConfig, Config};
use netsage::inference::{InferenceClient, ModelResponse, LONG_CONTEXT_MODEL, PRIMARY_MODEL};
use netsage::input::{CaptureError, ObservationSource};
use netsage::models::{Severity, Timeframe, TrafficObservation, VerdictSeverity};
use netsage::monitoring::{MonitoringSession, MonitoringSettings};
use netsage::persistence::{LogStore, SqliteLogStore};
use netsage::pipeline::IngestPipeline;
use netsage::report::generate_report;

/// Answers every prompt with a fixed analysis per model
struct CannedModels {
    calls: AtomicUsize,
}

impl InferenceClient for CannedModels {
    async fn invoke_model(&self, model_id: &str, _prompt: &str) -> ModelResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match model_id {
            PRIMARY_MODEL => ModelResponse::ok(
                "SECURITY STATUS: Critical\n\
                 ANOMALIES DETECTED: brute force against ssh from 203.0.113.9\n\
                 RECOMMENDED ACTIONS: block 203.0.113.9 at the edge\n\
                 RISK SCORE: 9"
                    .to_string(),
            ),
            LONG_CONTEXT_MODEL => ModelResponse::ok(
                "SECURITY STATUS: Warning\n\
                 SUSPICIOUS trend: repeated denials overnight\n\
                 RISK SCORE: 5"
                    .to_string(),
            ),
            other => ModelResponse::failure(format!("unexpected model {}", other)),
        }
    }
}

/// Emits one suspicious observation per poll
struct ScanSource;

impl ObservationSource for ScanSource {
    async fn poll(&self) -> Result<Vec<TrafficObservation>, CaptureError> {
        Ok(vec![TrafficObservation::new("10.0.0.7", "203.0.113.9", "TCP")
            .with_ports(Some(40000), Some(3389))
            .with_length(1600)])
    }
}

fn network_log(now: chrono::DateTime<Utc>) -> String {
    let stamp = (now - Duration::minutes(30)).format("%Y-%m-%d %H:%M:%S");
    format!(
        "{stamp} [WARNING] Multiple failed login attempts from 203.0.113.9\n\
         {stamp} [INFO] Connection established from 10.0.0.7\n\
         \n\
         {stamp} [INFO] request denied from 203.0.113.9\n\
         a line in no known format\n"
    )
}

#[test]
fn test_upload_ingest_and_report() {
    let now = Utc::now();
    let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::in_memory().unwrap());
    let pipeline = IngestPipeline::new(Arc::clone(&store))
        .with_policy(Config::default().ingest.upload_policy());

    let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
    file.write_all(network_log(now).as_bytes()).unwrap();

    let summary = pipeline.ingest_file(file.path()).unwrap();
    assert_eq!(summary.stored, 4);
    assert_eq!(summary.severity_counts.danger, 1);
    assert_eq!(summary.severity_counts.warning, 1);
    assert_eq!(summary.severity_counts.info, 2);

    let report = generate_report(store.as_ref(), Timeframe::Day, Utc::now()).unwrap();
    assert_eq!(report.total_logs, 4);
    assert_eq!(report.unique_source_ips, 2);
    assert_eq!(report.top_source_ips[0].ip, "203.0.113.9");
    assert_eq!(report.top_source_ips[0].count, 2);
    assert_eq!(report.total_insights, 0);
}

#[tokio::test]
async fn test_batch_analysis_shows_up_in_report() {
    let now = Utc::now();
    let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::in_memory().unwrap());
    let pipeline = IngestPipeline::new(Arc::clone(&store));
    pipeline.ingest(network_log(now).as_bytes(), "net.log").unwrap();

    let records = store.records_since(now - Duration::hours(1)).unwrap();
    let client = Arc::new(CannedModels { calls: AtomicUsize::new(0) });
    let analysis = BatchAnalyzer::new(Arc::clone(&client), Arc::clone(&store))
        .analyze(&records)
        .await
        .unwrap();

    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    assert!(analysis.failures.is_empty());
    assert_eq!(analysis.max_risk_score(), Some(9));
    assert_eq!(analysis.insights_stored, 2);
    assert_eq!(analysis.recommendations_stored, 1);
    // Two records are above Info
    assert!(analysis.verdicts.iter().all(|v| v.affected_observation_count == 2));

    let report = generate_report(store.as_ref(), Timeframe::Day, Utc::now()).unwrap();
    assert_eq!(report.total_insights, 2);
    assert_eq!(report.high_confidence_insights, 1);
    assert_eq!(report.total_recommendations, 1);
    assert_eq!(report.high_priority_recommendations, 1);

    let verdicts = store.recent_verdicts(10).unwrap();
    assert_eq!(verdicts.len(), 2);
}

#[tokio::test]
async fn test_monitoring_verdicts_reach_store_and_alert_filter() {
    let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::in_memory().unwrap());
    let (verdict_tx, mut verdict_rx) = mpsc::channel(8);
    let session = MonitoringSession::with_verdict_sink(
        Arc::new(ScanSource),
        Arc::new(CannedModels { calls: AtomicUsize::new(0) }),
        MonitoringSettings::default(),
        verdict_tx,
    );

    assert_eq!(session.ingest_tick().await, 1);
    assert_eq!(session.ingest_tick().await, 1);
    let verdict = session.analysis_tick().await.unwrap();
    assert_eq!(verdict.severity, VerdictSeverity::Critical);
    assert_eq!(verdict.affected_observation_count, 2);
    assert_eq!(session.anomaly_count(), 1);

    let forwarded = verdict_rx.recv().await.unwrap();
    store.save_verdict(&forwarded).unwrap();
    assert_eq!(store.recent_verdicts(1).unwrap()[0].risk_score, 9);

    let dispatcher = AlertDispatcher::new(AlertConfig {
        enabled: true,
        min_risk_score: 10,
        ..AlertConfig::default()
    });
    // Critical verdicts bypass the risk threshold
    assert!(dispatcher.should_dispatch(&forwarded));
}

#[test]
fn test_fallback_records_keep_raw_line() {
    let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::in_memory().unwrap());
    let pipeline = IngestPipeline::new(Arc::clone(&store));

    let summary = pipeline.ingest(b"   padded unknown line  \n", "notes.txt").unwrap();
    assert_eq!(summary.stored, 1);

    let stored = store.records_since(Utc::now() - Duration::minutes(1)).unwrap();
    assert_eq!(stored[0].message, "padded unknown line");
    assert_eq!(stored[0].raw_log, "   padded unknown line  ");
    assert_eq!(stored[0].severity, Severity::Info);
}
