//! Keyword-based severity promotion
//!
//! Looks for well-known security phrases in a record's message and raises
//! its severity accordingly. This is a heuristic: novel phrasing slips
//! through, and that is accepted.

use crate::models::{LogRecord, Severity};

const DANGER_KEYWORDS: &[&str] = &[
    "failed login",
    "unauthorized",
    "attack",
    "intrusion",
    "malware",
    "virus",
    "exploit",
];

const WARNING_KEYWORDS: &[&str] = &[
    "suspicious",
    "unusual",
    "multiple attempts",
    "blocked",
    "denied",
];

/// Rule-based severity classifier
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    danger_keywords: Vec<String>,
    warning_keywords: Vec<String>,
}

impl SeverityClassifier {
    /// Create a classifier with the built-in keyword lists
    pub fn new() -> Self {
        SeverityClassifier {
            danger_keywords: DANGER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            warning_keywords: WARNING_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Create a classifier with custom keyword lists (matched case-insensitively)
    pub fn with_keywords(danger_keywords: Vec<String>, warning_keywords: Vec<String>) -> Self {
        SeverityClassifier {
            danger_keywords: danger_keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            warning_keywords: warning_keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Classify a message given the severity it already has.
    ///
    /// Never returns something lower than `current`, and applying it twice
    /// gives the same answer as applying it once.
    pub fn classify(&self, message: &str, current: Severity) -> Severity {
        let lower = message.to_lowercase();

        if self.danger_keywords.iter().any(|k| lower.contains(k.as_str())) {
            return Severity::Danger;
        }

        if self.warning_keywords.iter().any(|k| lower.contains(k.as_str())) {
            return current.max(Severity::Warning);
        }

        current
    }

    /// Classify a record in place
    pub fn apply(&self, record: &mut LogRecord) {
        record.severity = self.classify(&record.message, record.severity);
    }
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self::new()
    }
}
