use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use netsage::analysis::BatchAnalyzer;
use netsage::config::Config;
use netsage::detection::RiskScorer;
use netsage::inference::{InferenceClient, ScriptInference, WatsonxClient};
use netsage::models::{LogRecord, Timeframe, TrafficObservation};
use netsage::output::{OutputFormat, OutputHandler};
use netsage::persistence::{LogStore, SqliteLogStore};
use netsage::pipeline::IngestPipeline;
use netsage::report::generate_report;

/// NetSage command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "netsage", about = "Network log analysis CLI")]
pub struct Cli {
    /// Path to configuration file
    #[structopt(short, long, default_value = "netsage.toml", global = true)]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "netsage.toml")]
        output: PathBuf,
    },
    /// Parse and classify a log file without storing it
    Parse {
        /// Path to log file
        #[structopt(short, long)]
        file: PathBuf,
        /// Number of records to show
        #[structopt(short, long, default_value = "10")]
        lines: usize,
    },
    /// Validate, parse and store a log file
    Ingest {
        /// Path to log file
        #[structopt(short, long)]
        file: PathBuf,
    },
    /// List stored logs, newest first
    Logs {
        /// Number of records to show
        #[structopt(short, long, default_value = "50")]
        limit: usize,
        /// Only show records whose message, source IP or severity contains this
        #[structopt(short, long)]
        search: Option<String>,
    },
    /// Summarize stored logs and analysis results
    Report {
        /// One of 24h, 7d, 30d
        #[structopt(short, long, default_value = "7d")]
        timeframe: String,
    },
    /// Run both models over recently stored logs
    Analyze {
        /// One of 24h, 7d, 30d
        #[structopt(short, long, default_value = "24h")]
        timeframe: String,
    },
    /// Score a single traffic observation
    Score {
        #[structopt(long)]
        src: String,
        #[structopt(long)]
        dst: String,
        #[structopt(long, default_value = "TCP")]
        protocol: String,
        #[structopt(long)]
        src_port: Option<u16>,
        #[structopt(long)]
        dst_port: Option<u16>,
        #[structopt(long, default_value = "0")]
        length: u32,
    },
    /// Delete stored data older than the given number of days
    Prune {
        #[structopt(short, long)]
        days: Option<u32>,
    },
}

fn load_config(path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        log::debug!("Config file {:?} not found, using defaults", path);
        Ok(Config::default())
    }
}

fn output_handler(config: &Config) -> Result<OutputHandler, Box<dyn std::error::Error>> {
    let format = OutputFormat::parse(&config.output.format).unwrap_or(OutputFormat::Console);
    Ok(OutputHandler::new(format, config.output.file_path.clone())?)
}

fn open_store(config: &Config) -> Result<Arc<dyn LogStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteLogStore::new(&config.persistence.database_path)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli.command {
        Command::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Command::Parse { file, lines } => {
            let config = load_config(&cli.config)?;
            let policy = config.ingest.upload_policy();
            let raw = policy.read_file(&file)?;

            let pipeline = IngestPipeline::new(Arc::new(SqliteLogStore::in_memory()?));
            let source = file.display().to_string();
            let records = pipeline.parse_and_classify(&raw, &source);
            let display_count = std::cmp::min(lines, records.len());

            println!("Parsed {} record(s) (showing {}):\n", records.len(), display_count);
            let mut output = output_handler(&config)?;
            for record in records.iter().take(display_count) {
                output.write(record)?;
            }
            output.flush()?;
        }
        Command::Ingest { file } => {
            let config = load_config(&cli.config)?;
            let pipeline =
                IngestPipeline::new(open_store(&config)?).with_policy(config.ingest.upload_policy());

            let summary = pipeline.ingest_file(&file)?;
            println!(
                "Stored {} record(s) from {} (info {}, warning {}, danger {})",
                summary.stored,
                summary.source_file,
                summary.severity_counts.info,
                summary.severity_counts.warning,
                summary.severity_counts.danger
            );
        }
        Command::Logs { limit, search } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;

            let records = store.recent_records(limit, search.as_deref())?;
            if records.is_empty() {
                println!("No stored logs match");
                return Ok(());
            }
            let mut output = output_handler(&config)?;
            for record in &records {
                output.write(record)?;
            }
            output.flush()?;
        }
        Command::Report { timeframe } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;

            let summary = generate_report(store.as_ref(), Timeframe::parse(&timeframe), Utc::now())?;
            let mut output = output_handler(&config)?;
            output.write(&summary)?;
            output.flush()?;
        }
        Command::Analyze { timeframe } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            let since = Timeframe::parse(&timeframe).start_from(Utc::now());
            let records = store.records_since(since)?;

            if records.is_empty() {
                println!("No stored logs in the last {}", Timeframe::parse(&timeframe));
                return Ok(());
            }

            let runtime = tokio::runtime::Runtime::new()?;
            let timeout = std::time::Duration::from_secs(config.inference.timeout_secs);
            let settings = config.inference.model.clone();

            match config.inference.backend.as_str() {
                "http" => {
                    let client = Arc::new(WatsonxClient::new(settings, timeout));
                    runtime.block_on(analyze(client, store, &records, &config))?;
                }
                _ => {
                    let client = Arc::new(ScriptInference::new(
                        &config.inference.interpreter,
                        config.inference.script_path.clone(),
                        settings,
                        timeout,
                    ));
                    runtime.block_on(analyze(client, store, &records, &config))?;
                }
            }
        }
        Command::Score { src, dst, protocol, src_port, dst_port, length } => {
            let observation = TrafficObservation::new(&src, &dst, &protocol)
                .with_ports(src_port, dst_port)
                .with_length(length);
            let scored = RiskScorer::new().assess(observation);

            println!("{}", serde_json::to_string_pretty(&scored)?);
        }
        Command::Prune { days } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            let days = days.unwrap_or(config.persistence.retention_days);

            let removed = store.prune_old_data(Utc::now() - Duration::days(i64::from(days)))?;
            println!("Removed {} row(s) older than {} day(s)", removed, days);
        }
    }

    Ok(())
}

async fn analyze<C: InferenceClient>(
    client: Arc<C>,
    store: Arc<dyn LogStore>,
    records: &[LogRecord],
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = BatchAnalyzer::new(client, store).analyze(records).await?;

    for failure in &analysis.failures {
        eprintln!("Model {} failed: {}", failure.model_id, failure.error);
    }

    let mut output = output_handler(config)?;
    for verdict in &analysis.verdicts {
        output.write(verdict)?;
    }
    output.flush()?;

    println!(
        "{} insight(s) and {} recommendation(s) stored",
        analysis.insights_stored, analysis.recommendations_stored
    );
    Ok(())
}
