//! Long-ride detection.

use crate::event::RideEvent;

pub const DEFAULT_LONG_RIDE_THRESHOLD_MINUTES: u32 = 60;
pub const LONG_RIDE_MESSAGE: &str = "Long ride detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyRecord {
    pub city: String,
    pub ride_id: String,
    pub duration_minutes: u32,
    pub message: String,
}

/// Flags completed rides longer than a threshold. Holds no per-ride state, so
/// a redelivered event is flagged again.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    threshold_minutes: u32,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_RIDE_THRESHOLD_MINUTES)
    }
}

impl AnomalyDetector {
    pub fn new(threshold_minutes: u32) -> Self {
        Self { threshold_minutes }
    }

    pub fn threshold_minutes(&self) -> u32 {
        self.threshold_minutes
    }

    pub fn inspect(&self, event: &RideEvent) -> Option<AnomalyRecord> {
        if !event.is_completed() {
            return None;
        }

        let duration = event.duration_minutes?;
        (duration > self.threshold_minutes).then(|| AnomalyRecord {
            city: event.city.clone(),
            ride_id: event.ride_id.clone(),
            duration_minutes: duration,
            message: LONG_RIDE_MESSAGE.to_string(),
        })
    }
}
