//! Real-time monitoring: periodic capture polling and anomaly analysis

pub mod session;

pub use session::MonitoringSession;

use std::time::Duration;

use crate::detection::window::{DEFAULT_ANALYSIS_SLICE, DEFAULT_WINDOW_CAPACITY};
use crate::inference::PRIMARY_MODEL;

/// Most alerts kept per session, newest first
pub const DEFAULT_MAX_ALERTS: usize = 10;

/// Shortest period either periodic task will run at
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Timing and sizing of a monitoring session
#[derive(Debug, Clone)]
pub struct MonitoringSettings {
    /// Period of the capture poll
    pub poll_interval: Duration,
    /// Period of the model analysis
    pub analysis_interval: Duration,
    pub window_capacity: usize,
    /// Most-recent observations sent to the model each analysis
    pub analysis_slice: usize,
    pub model_id: String,
    pub max_alerts: usize,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        MonitoringSettings {
            poll_interval: Duration::from_secs(3),
            analysis_interval: Duration::from_secs(15),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            analysis_slice: DEFAULT_ANALYSIS_SLICE,
            model_id: PRIMARY_MODEL.to_string(),
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }
}

impl MonitoringSettings {
    /// Raise intervals below [`MIN_TICK_INTERVAL`] to it
    pub fn clamped(mut self) -> Self {
        if self.poll_interval < MIN_TICK_INTERVAL {
            log::warn!(
                "Poll interval {:?} too short, using {:?}",
                self.poll_interval,
                MIN_TICK_INTERVAL
            );
            self.poll_interval = MIN_TICK_INTERVAL;
        }
        if self.analysis_interval < MIN_TICK_INTERVAL {
            log::warn!(
                "Analysis interval {:?} too short, using {:?}",
                self.analysis_interval,
                MIN_TICK_INTERVAL
            );
            self.analysis_interval = MIN_TICK_INTERVAL;
        }
        self
    }
}
