//! SQLite implementation of the LogStore trait

use super::{LogStore, PersistenceError};
use crate::models::{AnomalyVerdict, Insight, LogRecord, Recommendation};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed store
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    /// Open (or create) the database at `db_path` and initialize the schema
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteLogStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteLogStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        self.conn()?.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    fn record_from_row(row: &Row<'_>) -> Result<LogRecord, PersistenceError> {
        let timestamp: String = row.get(0)?;
        let severity: String = row.get(2)?;
        let event_type: String = row.get(4)?;
        let line_number: i64 = row.get(6)?;

        Ok(LogRecord {
            timestamp: decode_time(&timestamp)?,
            message: row.get(1)?,
            severity: severity.parse().map_err(PersistenceError::InvalidData)?,
            source_ip: row.get(3)?,
            event_type: event_type.parse().map_err(PersistenceError::InvalidData)?,
            source_file: row.get(5)?,
            line_number: usize::try_from(line_number)
                .map_err(|_| PersistenceError::InvalidData(format!("line number {}", line_number)))?,
            raw_log: row.get(7)?,
        })
    }

    fn verdict_from_row(row: &Row<'_>) -> Result<AnomalyVerdict, PersistenceError> {
        let timestamp: String = row.get(0)?;
        let severity: String = row.get(1)?;
        let risk_score: i64 = row.get(2)?;
        let anomalies: String = row.get(4)?;
        let recommendations: String = row.get(5)?;
        let affected: i64 = row.get(6)?;

        Ok(AnomalyVerdict {
            timestamp: decode_time(&timestamp)?,
            severity: severity.parse().map_err(PersistenceError::InvalidData)?,
            risk_score: u8::try_from(risk_score)
                .map_err(|_| PersistenceError::InvalidData(format!("risk score {}", risk_score)))?,
            raw_analysis_text: row.get(3)?,
            anomalies: serde_json::from_str(&anomalies)?,
            recommendations: serde_json::from_str(&recommendations)?,
            affected_observation_count: usize::try_from(affected).unwrap_or(0),
            model_id: row.get(7)?,
        })
    }
}

/// Fixed-width RFC 3339 so that string order matches time order
fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PersistenceError::InvalidData(format!("Invalid timestamp: {}", raw)))
}

/// `%term%` with LIKE wildcards in `term` matched literally
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl LogStore for SqliteLogStore {
    fn save_records(&self, records: &[LogRecord]) -> Result<usize, PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO log_records
                 (timestamp, message, severity, source_ip, event_type, source_file, line_number, raw_log)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for record in records {
                stmt.execute(params![
                    encode_time(&record.timestamp),
                    record.message,
                    record.severity.as_str(),
                    record.source_ip,
                    record.event_type.as_str(),
                    record.source_file,
                    record.line_number as i64,
                    record.raw_log,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn query_records(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, message, severity, source_ip, event_type, source_file, line_number, raw_log
             FROM log_records
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY id ASC",
        )?;

        let mut rows = stmt.query(params![encode_time(&start), encode_time(&end)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Self::record_from_row(row)?);
        }
        Ok(records)
    }

    fn recent_records(
        &self,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Vec<LogRecord>, PersistenceError> {
        let conn = self.conn()?;
        let mut records = Vec::new();

        match search.map(str::trim).filter(|term| !term.is_empty()) {
            Some(term) => {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, message, severity, source_ip, event_type, source_file, line_number, raw_log
                     FROM log_records
                     WHERE message LIKE ?1 ESCAPE '\\'
                        OR source_ip LIKE ?1 ESCAPE '\\'
                        OR severity LIKE ?1 ESCAPE '\\'
                     ORDER BY id DESC
                     LIMIT ?2",
                )?;
                let mut rows = stmt.query(params![like_pattern(term), limit as i64])?;
                while let Some(row) = rows.next()? {
                    records.push(Self::record_from_row(row)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, message, severity, source_ip, event_type, source_file, line_number, raw_log
                     FROM log_records
                     ORDER BY id DESC
                     LIMIT ?",
                )?;
                let mut rows = stmt.query(params![limit as i64])?;
                while let Some(row) = rows.next()? {
                    records.push(Self::record_from_row(row)?);
                }
            }
        }
        Ok(records)
    }

    fn save_verdict(&self, verdict: &AnomalyVerdict) -> Result<(), PersistenceError> {
        let anomalies = serde_json::to_string(&verdict.anomalies)?;
        let recommendations = serde_json::to_string(&verdict.recommendations)?;

        self.conn()?.execute(
            "INSERT INTO anomaly_verdicts
             (timestamp, severity, risk_score, raw_analysis_text, anomalies, recommendations,
              affected_observation_count, model_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                encode_time(&verdict.timestamp),
                verdict.severity.as_str(),
                i64::from(verdict.risk_score),
                verdict.raw_analysis_text,
                anomalies,
                recommendations,
                verdict.affected_observation_count as i64,
                verdict.model_id,
            ],
        )?;
        Ok(())
    }

    fn recent_verdicts(&self, limit: usize) -> Result<Vec<AnomalyVerdict>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, severity, risk_score, raw_analysis_text, anomalies, recommendations,
                    affected_observation_count, model_id
             FROM anomaly_verdicts
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )?;

        let mut rows = stmt.query(params![limit as i64])?;
        let mut verdicts = Vec::new();
        while let Some(row) = rows.next()? {
            verdicts.push(Self::verdict_from_row(row)?);
        }
        Ok(verdicts)
    }

    fn save_insight(&self, insight: &Insight) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "INSERT INTO insights (title, description, confidence, model_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                insight.title,
                insight.description,
                insight.confidence,
                insight.model_id,
                encode_time(&insight.created_at),
            ],
        )?;
        Ok(())
    }

    fn query_insights(&self, since: DateTime<Utc>) -> Result<Vec<Insight>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT title, description, confidence, model_id, created_at
             FROM insights
             WHERE created_at >= ?
             ORDER BY id ASC",
        )?;

        let mut rows = stmt.query(params![encode_time(&since)])?;
        let mut insights = Vec::new();
        while let Some(row) = rows.next()? {
            let created_at: String = row.get(4)?;
            insights.push(Insight {
                title: row.get(0)?,
                description: row.get(1)?,
                confidence: row.get(2)?,
                model_id: row.get(3)?,
                created_at: decode_time(&created_at)?,
            });
        }
        Ok(insights)
    }

    fn save_recommendation(&self, recommendation: &Recommendation) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "INSERT INTO recommendations (title, action, priority, category, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                recommendation.title,
                recommendation.action,
                recommendation.priority.as_str(),
                recommendation.category,
                encode_time(&recommendation.created_at),
            ],
        )?;
        Ok(())
    }

    fn query_recommendations(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT title, action, priority, category, created_at
             FROM recommendations
             WHERE created_at >= ?
             ORDER BY id ASC",
        )?;

        let mut rows = stmt.query(params![encode_time(&since)])?;
        let mut recommendations = Vec::new();
        while let Some(row) = rows.next()? {
            let priority: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            recommendations.push(Recommendation {
                title: row.get(0)?,
                action: row.get(1)?,
                priority: priority.parse().map_err(PersistenceError::InvalidData)?,
                category: row.get(3)?,
                created_at: decode_time(&created_at)?,
            });
        }
        Ok(recommendations)
    }

    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let mut conn = self.conn()?;
        let cutoff = encode_time(&before);
        let tx = conn.transaction()?;

        let mut total_deleted = 0usize;
        total_deleted += tx.execute("DELETE FROM log_records WHERE timestamp < ?", params![cutoff])?;
        total_deleted +=
            tx.execute("DELETE FROM anomaly_verdicts WHERE timestamp < ?", params![cutoff])?;
        total_deleted += tx.execute("DELETE FROM insights WHERE created_at < ?", params![cutoff])?;
        total_deleted +=
            tx.execute("DELETE FROM recommendations WHERE created_at < ?", params![cutoff])?;

        tx.commit()?;
        Ok(total_deleted)
    }

    fn clear_all(&self) -> Result<(), PersistenceError> {
        self.conn()?.execute_batch(
            "DELETE FROM log_records;
             DELETE FROM anomaly_verdicts;
             DELETE FROM insights;
             DELETE FROM recommendations;",
        )?;
        Ok(())
    }
}
