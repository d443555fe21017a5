//! Bounded most-recent-N buffer of scored observations
//!
//! Eviction is FIFO by insertion. Statistics are recomputed from the current
//! contents on every call rather than maintained incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use super::risk::is_suspicious_port;
use crate::models::{RiskLevel, ScoredObservation};

/// Default capacity of the display buffer
pub const DEFAULT_WINDOW_CAPACITY: usize = 500;

/// Default number of most-recent entries fed to anomaly analysis
pub const DEFAULT_ANALYSIS_SLICE: usize = 50;

/// Summary statistics over a set of observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub observation_count: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub unique_sources: Vec<String>,
    pub unique_destinations: Vec<String>,
    pub protocols: Vec<String>,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub suspicious_ports_seen: Vec<u16>,
    pub average_packet_size: u32,
}

impl WindowStats {
    /// Compute statistics over `entries`, oldest first
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a ScoredObservation>,
    {
        let mut stats = WindowStats::default();
        let mut sources = BTreeSet::new();
        let mut destinations = BTreeSet::new();
        let mut protocols = BTreeSet::new();
        let mut ports = BTreeSet::new();
        let mut total_bytes = 0u64;

        for entry in entries {
            let obs = entry.observation();
            stats.observation_count += 1;

            if stats.first_seen.is_none() {
                stats.first_seen = Some(obs.timestamp);
            }
            stats.last_seen = Some(obs.timestamp);

            if !obs.source_ip.is_empty() {
                sources.insert(obs.source_ip.clone());
            }
            if !obs.destination_ip.is_empty() {
                destinations.insert(obs.destination_ip.clone());
            }
            if !obs.protocol.is_empty() {
                protocols.insert(obs.protocol.clone());
            }

            for port in [obs.source_port, obs.destination_port].into_iter().flatten() {
                if is_suspicious_port(port) {
                    ports.insert(port);
                }
            }

            match entry.risk().level {
                RiskLevel::High => stats.high_risk_count += 1,
                RiskLevel::Medium => stats.medium_risk_count += 1,
                RiskLevel::Low => {}
            }

            total_bytes += u64::from(obs.packet_length);
        }

        if stats.observation_count > 0 {
            let count = stats.observation_count as u64;
            let rounded = (total_bytes + count / 2) / count;
            stats.average_packet_size = u32::try_from(rounded).unwrap_or(u32::MAX);
        }

        stats.unique_sources = sources.into_iter().collect();
        stats.unique_destinations = destinations.into_iter().collect();
        stats.protocols = protocols.into_iter().collect();
        stats.suspicious_ports_seen = ports.into_iter().collect();
        stats
    }
}

/// Fixed-capacity FIFO window of scored observations
#[derive(Debug, Clone)]
pub struct SlidingWindowAggregator {
    capacity: usize,
    entries: VecDeque<ScoredObservation>,
}

impl SlidingWindowAggregator {
    /// Create a window holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SlidingWindowAggregator {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an entry, evicting the oldest ones beyond capacity
    pub fn push(&mut self, entry: ScoredObservation) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Append several entries in order
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = ScoredObservation>,
    {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Copy of the buffer, oldest to newest
    pub fn snapshot(&self) -> Vec<ScoredObservation> {
        self.entries.iter().cloned().collect()
    }

    /// Copy of the `n` most recent entries, oldest to newest
    pub fn recent(&self, n: usize) -> Vec<ScoredObservation> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Statistics over the whole buffer
    pub fn stats(&self) -> WindowStats {
        WindowStats::from_entries(self.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for SlidingWindowAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
