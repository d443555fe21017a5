//! Persistence for ingested records and analysis results
//!
//! Log records, model verdicts, insights and recommendations all go through
//! the [`LogStore`] trait so the pipeline and report code never depend on a
//! particular database.

pub mod sqlite_store;

pub use sqlite_store::SqliteLogStore;

use crate::models::{AnomalyVerdict, Insight, LogRecord, Recommendation};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Storage backend for records and analysis output
pub trait LogStore: Send + Sync {
    // =====================
    // Log records
    // =====================

    /// Store a batch of records atomically, returning how many were written.
    ///
    /// Either every record is stored or none is.
    fn save_records(&self, records: &[LogRecord]) -> Result<usize, PersistenceError>;

    /// Records whose timestamp falls in `[start, end]`, in insertion order
    fn query_records(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>, PersistenceError>;

    /// Up to `limit` records, newest first.
    ///
    /// With `search`, only records whose message, source IP or severity contains
    /// it (case-insensitive for ASCII) are returned.
    fn recent_records(
        &self,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Vec<LogRecord>, PersistenceError>;

    /// Records from `since` until now
    fn records_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>, PersistenceError> {
        self.query_records(since, Utc::now())
    }

    // =====================
    // Verdicts
    // =====================

    fn save_verdict(&self, verdict: &AnomalyVerdict) -> Result<(), PersistenceError>;

    /// Most recent verdicts first
    fn recent_verdicts(&self, limit: usize) -> Result<Vec<AnomalyVerdict>, PersistenceError>;

    // =====================
    // Insights and recommendations
    // =====================

    fn save_insight(&self, insight: &Insight) -> Result<(), PersistenceError>;

    fn query_insights(&self, since: DateTime<Utc>) -> Result<Vec<Insight>, PersistenceError>;

    fn save_recommendation(&self, recommendation: &Recommendation) -> Result<(), PersistenceError>;

    fn query_recommendations(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, PersistenceError>;

    // =====================
    // Maintenance
    // =====================

    /// Remove everything older than `before`, returning the number of rows deleted
    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, PersistenceError>;

    /// Clear all data
    fn clear_all(&self) -> Result<(), PersistenceError>;
}
