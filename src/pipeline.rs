//! Upload to storage: parse, classify, persist

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::detection::SeverityClassifier;
use crate::input::{LogRecordParser, UploadError, UploadPolicy};
use crate::models::{LogRecord, Severity, SeverityCounts};
use crate::persistence::{LogStore, PersistenceError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upload rejected: {0}")]
    Upload(#[from] UploadError),

    #[error("failed to store records: {0}")]
    Persistence(#[from] PersistenceError),
}

/// What one ingested batch contained
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub source_file: String,
    pub stored: usize,
    pub severity_counts: SeverityCounts,
}

/// Parses uploads, classifies each record and writes the batch to the store
pub struct IngestPipeline {
    parser: LogRecordParser,
    classifier: SeverityClassifier,
    policy: UploadPolicy,
    store: Arc<dyn LogStore>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        IngestPipeline {
            parser: LogRecordParser::new(),
            classifier: SeverityClassifier::new(),
            policy: UploadPolicy::default(),
            store,
        }
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: SeverityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Parse and classify without touching the store
    pub fn parse_and_classify(&self, raw: &[u8], source_file: &str) -> Vec<LogRecord> {
        let mut records = self.parser.parse(raw, source_file);
        for record in records.iter_mut() {
            self.classifier.apply(record);
        }
        records
    }

    /// Parse, classify and store one uploaded batch.
    ///
    /// The batch is written in a single transaction; on error nothing is stored.
    pub fn ingest(&self, raw: &[u8], source_file: &str) -> Result<IngestSummary, PipelineError> {
        let records = self.parse_and_classify(raw, source_file);
        let summary = self.store_batch(source_file, &records)?;
        Ok(summary)
    }

    /// Validate a file against the upload policy, then ingest it
    pub fn ingest_file(&self, path: &Path) -> Result<IngestSummary, PipelineError> {
        let raw = self.policy.read_file(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest(&raw, &name)
    }

    /// Classify and store records that were parsed elsewhere (tailer, syslog)
    pub fn ingest_records(&self, mut records: Vec<LogRecord>) -> Result<usize, PipelineError> {
        for record in records.iter_mut() {
            self.classifier.apply(record);
        }
        Ok(self.store.save_records(&records)?)
    }

    fn store_batch(
        &self,
        source_file: &str,
        records: &[LogRecord],
    ) -> Result<IngestSummary, PipelineError> {
        let stored = self.store.save_records(records)?;

        let mut severity_counts = SeverityCounts::default();
        for record in records {
            match record.severity {
                Severity::Info => severity_counts.info += 1,
                Severity::Warning => severity_counts.warning += 1,
                Severity::Danger => severity_counts.danger += 1,
            }
        }

        log::info!(
            "Ingested {} records from {} ({} warning, {} danger)",
            stored,
            source_file,
            severity_counts.warning,
            severity_counts.danger
        );

        Ok(IngestSummary {
            source_file: source_file.to_string(),
            stored,
            severity_counts,
        })
    }
}
