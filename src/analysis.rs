//! Batch analysis of ingested logs by both models
//!
//! The primary model looks for threats and remediations, the long-context
//! model for trends. Both run concurrently; one failing does not stop the
//! other. Extracted anomaly and recommendation lines are persisted as
//! insights and recommendations so reports can count them.

use chrono::Utc;
use std::sync::Arc;

use crate::detection::AnomalyReportBuilder;
use crate::inference::{InferenceClient, LONG_CONTEXT_MODEL, MAX_PROMPT_CHARS, PRIMARY_MODEL};
use crate::models::{
    AnomalyVerdict, Insight, LogRecord, Priority, Recommendation, Severity, VerdictSeverity,
};
use crate::persistence::{LogStore, PersistenceError};

/// Character budget for the log excerpt inside a prompt
const EXCERPT_BUDGET: usize = MAX_PROMPT_CHARS - 2_000;

/// A model that could not produce an analysis
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFailure {
    pub model_id: String,
    pub error: String,
}

/// Result of analysing one batch
#[derive(Debug, Clone)]
pub struct BatchAnalysis {
    pub verdicts: Vec<AnomalyVerdict>,
    pub failures: Vec<ModelFailure>,
    pub insights_stored: usize,
    pub recommendations_stored: usize,
    /// Both analyses stitched into one readable report
    pub report: String,
}

impl BatchAnalysis {
    /// Highest risk score across the models that answered
    pub fn max_risk_score(&self) -> Option<u8> {
        self.verdicts.iter().map(|v| v.risk_score).max()
    }
}

/// Sends batches of records to both models and stores what they find
pub struct BatchAnalyzer<C: InferenceClient> {
    client: Arc<C>,
    store: Arc<dyn LogStore>,
}

impl<C: InferenceClient> BatchAnalyzer<C> {
    pub fn new(client: Arc<C>, store: Arc<dyn LogStore>) -> Self {
        BatchAnalyzer { client, store }
    }

    /// Analyse `records` with both models.
    ///
    /// Model failures are reported in the result; only storage errors fail the call.
    pub async fn analyze(&self, records: &[LogRecord]) -> Result<BatchAnalysis, PersistenceError> {
        let excerpt = log_excerpt(records, EXCERPT_BUDGET);
        let primary_prompt = security_prompt(&excerpt);
        let trend_prompt = pattern_prompt(&excerpt);

        let (primary, trend) = tokio::join!(
            self.client.invoke_model(PRIMARY_MODEL, &primary_prompt),
            self.client.invoke_model(LONG_CONTEXT_MODEL, &trend_prompt),
        );

        let affected = records
            .iter()
            .filter(|r| r.severity != Severity::Info)
            .count();

        let mut analysis = BatchAnalysis {
            verdicts: Vec::new(),
            failures: Vec::new(),
            insights_stored: 0,
            recommendations_stored: 0,
            report: String::new(),
        };
        let mut sections = Vec::new();

        for (model_id, response) in [(PRIMARY_MODEL, primary), (LONG_CONTEXT_MODEL, trend)] {
            if !response.success {
                let error = response.error.unwrap_or_else(|| "unknown error".to_string());
                log::warn!("Batch analysis by {} failed: {}", model_id, error);
                sections.push((model_id, format!("Analysis unavailable: {}", error)));
                analysis.failures.push(ModelFailure {
                    model_id: model_id.to_string(),
                    error,
                });
                continue;
            }

            let mut verdict = AnomalyReportBuilder::new(model_id).build(&[], &response.text);
            verdict.affected_observation_count = affected;

            self.store.save_verdict(&verdict)?;
            analysis.insights_stored += self.store_insights(&verdict)?;
            analysis.recommendations_stored += self.store_recommendations(&verdict)?;

            sections.push((model_id, response.text));
            analysis.verdicts.push(verdict);
        }

        analysis.report = combined_report(&sections);
        log::info!(
            "Batch analysis of {} records: {} verdicts, {} insights, {} recommendations",
            records.len(),
            analysis.verdicts.len(),
            analysis.insights_stored,
            analysis.recommendations_stored
        );
        Ok(analysis)
    }

    fn store_insights(&self, verdict: &AnomalyVerdict) -> Result<usize, PersistenceError> {
        let confidence = f64::from(verdict.risk_score) / 10.0;
        for line in &verdict.anomalies {
            self.store.save_insight(&Insight {
                title: "Anomaly detected".to_string(),
                description: line.trim().to_string(),
                confidence,
                model_id: verdict.model_id.clone(),
                created_at: verdict.timestamp,
            })?;
        }
        Ok(verdict.anomalies.len())
    }

    fn store_recommendations(&self, verdict: &AnomalyVerdict) -> Result<usize, PersistenceError> {
        let priority = match verdict.severity {
            VerdictSeverity::Critical => Priority::High,
            VerdictSeverity::Warning => Priority::Medium,
            VerdictSeverity::Normal => Priority::Low,
        };
        for line in &verdict.recommendations {
            self.store.save_recommendation(&Recommendation {
                title: "Security recommendation".to_string(),
                action: line.trim().to_string(),
                priority,
                category: "security".to_string(),
                created_at: verdict.timestamp,
            })?;
        }
        Ok(verdict.recommendations.len())
    }
}

/// Most recent records rendered one per line, within `budget` characters
pub fn log_excerpt(records: &[LogRecord], budget: usize) -> String {
    let mut lines = Vec::new();
    let mut used = 0usize;

    for record in records.iter().rev() {
        let line = format!(
            "{} [{}] {} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.severity,
            record.source_ip.as_deref().unwrap_or("-"),
            record.message
        );
        let cost = line.chars().count() + 1;
        if used + cost > budget {
            break;
        }
        used += cost;
        lines.push(line);
    }

    if lines.len() < records.len() {
        log::debug!(
            "Log excerpt keeps the {} most recent of {} records",
            lines.len(),
            records.len()
        );
    }

    lines.reverse();
    lines.join("\n")
}

fn security_prompt(excerpt: &str) -> String {
    format!(
        "You are an expert network security analyst. Analyze the following network logs and \
provide actionable insights. Focus on:
1. Security threats and anomalies
2. Performance issues
3. Specific recommendations for remediation
4. Risk assessment

NETWORK LOGS:
{}

Answer with these sections:
SECURITY STATUS: Normal/Warning/Critical
ANOMALIES DETECTED: one line per suspicious pattern
RECOMMENDED ACTIONS: one line per action
RISK SCORE: a number from 1 to 10",
        excerpt
    )
}

fn pattern_prompt(excerpt: &str) -> String {
    format!(
        "You are a network pattern analysis expert. Analyze the following logs for long-term \
trends and patterns. Focus on:
1. Historical pattern recognition
2. Trend analysis over time
3. Anomaly detection in patterns
4. Predictive insights

NETWORK LOGS:
{}

Answer with these sections:
SECURITY STATUS: Normal/Warning/Critical
ANOMALIES DETECTED: one line per unusual pattern
RECOMMENDED ACTIONS: one line per action
RISK SCORE: a number from 1 to 10",
        excerpt
    )
}

fn combined_report(sections: &[(&str, String)]) -> String {
    let mut report = String::from("COMPREHENSIVE NETWORK ANALYSIS REPORT\n");
    for (model_id, text) in sections {
        let heading = if *model_id == PRIMARY_MODEL {
            "Real-time Analysis Summary"
        } else {
            "Historical Pattern Analysis"
        };
        report.push_str(&format!("\n{} ({}):\n{}\n", heading, model_id, text.trim()));
    }
    report
}
