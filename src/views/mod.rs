//! Derived aggregate views over the ride event stream.
//!
//! Per-city folds (active gauge, completion stats) run against the keyed
//! store; combiners join their outputs; the ranker and anomaly detector sit at
//! the edges of the graph.

pub mod active;
pub mod anomaly;
pub mod completion;
pub mod metrics;
pub mod ranking;

pub use active::{ActiveRidePolicy, ActiveRideTracker};
pub use anomaly::{AnomalyDetector, AnomalyRecord};
pub use completion::{AverageDurationCombiner, CompletionStatsTracker, average_duration};
pub use metrics::{CityMetrics, MetricsCombiner};
pub use ranking::{CityCount, Ranking, TopCitiesRanker};
