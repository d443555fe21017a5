pub mod anomaly;
pub mod classifier;
pub mod risk;
pub mod window;

pub use anomaly::{build_traffic_prompt, AnomalyReportBuilder};
pub use classifier::SeverityClassifier;
pub use risk::RiskScorer;
pub use window::{SlidingWindowAggregator, WindowStats};
