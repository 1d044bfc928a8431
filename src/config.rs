//! Engine and runtime settings.

use std::path::PathBuf;

use crate::views::active::ActiveRidePolicy;
use crate::views::anomaly::DEFAULT_LONG_RIDE_THRESHOLD_MINUTES;
use crate::views::ranking::DEFAULT_TOP_N;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub active_policy: ActiveRidePolicy,
    pub top_n: usize,
    pub anomaly_threshold_minutes: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            active_policy: ActiveRidePolicy::default(),
            top_n: DEFAULT_TOP_N,
            anomaly_threshold_minutes: DEFAULT_LONG_RIDE_THRESHOLD_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of worker tasks; each city is pinned to one.
    pub partitions: usize,
    /// Bound of each worker's inbox.
    pub channel_capacity: usize,
    pub checkpoint_path: Option<PathBuf>,
    /// Write a checkpoint every N dispatched events (0 disables periodic
    /// checkpoints; a final one is still written on shutdown).
    pub checkpoint_every: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            channel_capacity: 1024,
            checkpoint_path: None,
            checkpoint_every: 0,
        }
    }
}
