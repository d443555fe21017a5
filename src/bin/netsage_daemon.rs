use chrono::{Duration as ChronoDuration, Utc};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use netsage::alerting::{AlertDispatcher, AlertQueue};
use netsage::config::Config;
use netsage::inference::{InferenceClient, ScriptInference, WatsonxClient};
use netsage::input::{FileTailer, ScriptCapture, SyslogListener};
use netsage::models::{AnomalyVerdict, LogRecord};
use netsage::monitoring::MonitoringSession;
use netsage::output::{OutputFormat, OutputHandler};
use netsage::persistence::{LogStore, SqliteLogStore};
use netsage::pipeline::IngestPipeline;

/// Capacity of the channel between live log inputs and the batch writer
const RECORD_CHANNEL_SIZE: usize = 1000;

/// How long a partial batch waits before it is written anyway
const BATCH_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Main daemon entry point for NetSage
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting NetSage daemon...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("netsage.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        let _ = shutdown_tx.send(true);
    })?;

    let store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::new(&config.persistence.database_path)?);
    let cutoff = Utc::now() - ChronoDuration::days(i64::from(config.persistence.retention_days));
    match store.prune_old_data(cutoff) {
        Ok(removed) => log::info!("Pruned {} row(s) older than {} day(s)", removed, config.persistence.retention_days),
        Err(e) => log::error!("Failed to prune old data: {}", e),
    }

    let pipeline = Arc::new(
        IngestPipeline::new(Arc::clone(&store)).with_policy(config.ingest.upload_policy()),
    );
    let mut tasks = Vec::new();

    // Live log inputs feed one batch writer
    let (record_tx, record_rx) = mpsc::channel::<LogRecord>(RECORD_CHANNEL_SIZE);

    if let Some(ref path) = config.ingest.tail_file {
        let mut tailer = FileTailer::new(path.clone()).from_start(config.ingest.tail_from_start);
        let tx = record_tx.clone();
        log::info!("Monitoring log file: {:?}", path);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = tailer.run(tx).await {
                log::error!("File tailer stopped: {}", e);
            }
        }));
    }

    if let Some(ref address) = config.ingest.syslog_address {
        let mut listener = SyslogListener::bind(address).await?;
        let tx = record_tx.clone();
        log::info!("Listening on syslog: {}", listener.local_addr()?);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = listener.run(tx).await {
                log::error!("Syslog listener stopped: {}", e);
            }
        }));
    }
    drop(record_tx);

    let writer = tokio::spawn(write_batches(
        Arc::clone(&pipeline),
        record_rx,
        config.ingest.batch_size,
        shutdown_rx.clone(),
    ));

    // Alerts
    let (alert_tx, alert_rx) = AlertDispatcher::create_channel();
    let alert_queue = AlertQueue::new(alert_tx);
    let dispatcher = tokio::spawn(AlertDispatcher::new(config.alerting.clone()).run(alert_rx));

    let format = OutputFormat::parse(&config.output.format).unwrap_or(OutputFormat::Console);
    let output = OutputHandler::new(format, config.output.file_path.clone())?;

    if config.monitoring.enabled {
        let timeout = Duration::from_secs(config.inference.timeout_secs);
        let settings = config.inference.model.clone();

        match config.inference.backend.as_str() {
            "http" => {
                let client = Arc::new(WatsonxClient::new(settings, timeout));
                monitor(&config, client, Arc::clone(&store), alert_queue, output, shutdown_rx).await;
            }
            _ => {
                let client = Arc::new(ScriptInference::new(
                    &config.inference.interpreter,
                    config.inference.script_path.clone(),
                    settings,
                    timeout,
                ));
                monitor(&config, client, Arc::clone(&store), alert_queue, output, shutdown_rx).await;
            }
        }
    } else {
        log::info!("Traffic monitoring disabled");
        drop(alert_queue);
        wait_for_shutdown(shutdown_rx).await;
    }

    // Inputs only end on error, so cancel them once the writer has flushed
    if let Err(e) = writer.await {
        log::error!("Batch writer ended abnormally: {}", e);
    }
    for task in tasks {
        task.abort();
    }
    if let Err(e) = dispatcher.await {
        log::error!("Alert dispatcher ended abnormally: {}", e);
    }

    log::info!("NetSage daemon stopped");
    Ok(())
}

/// Run a monitoring session until shutdown, storing and forwarding every verdict
async fn monitor<C: InferenceClient + 'static>(
    config: &Config,
    client: Arc<C>,
    store: Arc<dyn LogStore>,
    alert_queue: AlertQueue,
    mut output: OutputHandler,
    shutdown: watch::Receiver<bool>,
) {
    let capture = Arc::new(ScriptCapture::new(
        &config.capture.interpreter,
        config.capture.script_path.clone(),
        Duration::from_secs(config.capture.timeout_secs),
    ));

    let (verdict_tx, mut verdict_rx) = mpsc::channel::<AnomalyVerdict>(32);
    let mut session = MonitoringSession::with_verdict_sink(
        capture,
        client,
        config.monitoring.to_settings(),
        verdict_tx,
    );

    let sink = tokio::spawn(async move {
        while let Some(verdict) = verdict_rx.recv().await {
            if let Err(e) = store.save_verdict(&verdict) {
                log::error!("Failed to store verdict: {}", e);
            }
            if let Err(e) = output.write(&verdict) {
                log::error!("Failed to write verdict: {}", e);
            }
            if verdict.is_alert_worthy() {
                log::warn!(
                    "ANOMALY DETECTED: {} risk {}/10 ({} affected observations)",
                    verdict.severity,
                    verdict.risk_score,
                    verdict.affected_observation_count
                );
                alert_queue.queue_alert(verdict);
            }
        }
        if let Err(e) = output.flush() {
            log::error!("Failed to flush output: {}", e);
        }
    });

    session.start().await;
    log::info!("Daemon running. Press Ctrl+C to stop.");

    wait_for_shutdown(shutdown).await;

    log::info!(
        "Stopping monitoring after {} anomal{}",
        session.anomaly_count(),
        if session.anomaly_count() == 1 { "y" } else { "ies" }
    );
    // Dropping the session closes the verdict channel, which ends the sink
    session.shutdown().await;
    if let Err(e) = sink.await {
        log::error!("Verdict sink ended abnormally: {}", e);
    }
}

/// Collect records from live inputs and store them in batches
async fn write_batches(
    pipeline: Arc<IngestPipeline>,
    mut rx: mpsc::Receiver<LogRecord>,
    batch_size: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(BATCH_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            record = rx.recv() => match record {
                Some(record) => {
                    batch.push(record);
                    if batch.len() >= batch_size {
                        flush_batch(&pipeline, &mut batch);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => flush_batch(&pipeline, &mut batch),
        }
    }

    // Keep whatever is already queued
    while let Ok(record) = rx.try_recv() {
        batch.push(record);
    }
    flush_batch(&pipeline, &mut batch);
}

fn flush_batch(pipeline: &IngestPipeline, batch: &mut Vec<LogRecord>) {
    if batch.is_empty() {
        return;
    }
    match pipeline.ingest_records(std::mem::take(batch)) {
        Ok(stored) => log::debug!("Stored {} live record(s)", stored),
        Err(e) => log::error!("Failed to store live records: {}", e),
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}
