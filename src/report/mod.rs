//! Descriptive statistics over a reporting window

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{
    Insight, IpCount, LogRecord, Priority, Recommendation, ReportSummary, Severity,
    SeverityCounts, Timeframe,
};
use crate::persistence::{LogStore, PersistenceError};

/// Number of entries in the top source IP table
pub const TOP_SOURCE_IPS: usize = 10;

/// Insights above this confidence count as high-confidence
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// Builds report summaries from already-fetched collections
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAggregator;

impl ReportAggregator {
    pub fn new() -> Self {
        ReportAggregator
    }

    /// Compute the summary for `timeframe`.
    ///
    /// Pure: the same inputs always give the same summary.
    pub fn aggregate(
        &self,
        timeframe: Timeframe,
        logs: &[LogRecord],
        insights: &[Insight],
        recommendations: &[Recommendation],
    ) -> ReportSummary {
        let mut severity_counts = SeverityCounts::default();
        let mut ip_counts: HashMap<&str, usize> = HashMap::new();

        for record in logs {
            match record.severity {
                Severity::Info => severity_counts.info += 1,
                Severity::Warning => severity_counts.warning += 1,
                Severity::Danger => severity_counts.danger += 1,
            }

            if let Some(ip) = record.source_ip.as_deref().filter(|ip| !ip.is_empty()) {
                *ip_counts.entry(ip).or_insert(0) += 1;
            }
        }

        let unique_source_ips = ip_counts.len();

        let mut top_source_ips: Vec<IpCount> = ip_counts
            .into_iter()
            .map(|(ip, count)| IpCount {
                ip: ip.to_string(),
                count,
            })
            .collect();
        // Ties are broken by address so the table is stable
        top_source_ips.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        top_source_ips.truncate(TOP_SOURCE_IPS);

        ReportSummary {
            timeframe,
            total_logs: logs.len(),
            severity_counts,
            unique_source_ips,
            top_source_ips,
            total_insights: insights.len(),
            high_confidence_insights: insights
                .iter()
                .filter(|insight| insight.confidence > HIGH_CONFIDENCE)
                .count(),
            total_recommendations: recommendations.len(),
            high_priority_recommendations: recommendations
                .iter()
                .filter(|rec| rec.priority == Priority::High)
                .count(),
        }
    }
}

/// Fetch the window's data from `store` and summarize it
pub fn generate_report<S: LogStore + ?Sized>(
    store: &S,
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> Result<ReportSummary, PersistenceError> {
    let start = timeframe.start_from(now);
    let logs = store.query_records(start, now)?;
    let insights = store.query_insights(start)?;
    let recommendations = store.query_recommendations(start)?;

    log::info!(
        "Generating {} report: {} logs, {} insights, {} recommendations",
        timeframe,
        logs.len(),
        insights.len(),
        recommendations.len()
    );

    Ok(ReportAggregator::new().aggregate(timeframe, &logs, &insights, &recommendations))
}
