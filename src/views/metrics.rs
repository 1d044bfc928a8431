//! Per-city composite of the active, completed and average views.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityMetrics {
    pub active_rides: u64,
    pub rides_completed: u64,
    pub avg_duration: f64,
}

/// Left join across the three metric views.
///
/// Every input change produces a fresh composite; sides not yet seen for a
/// city stay at zero.
#[derive(Debug, Default)]
pub struct MetricsCombiner {
    latest: DashMap<String, CityMetrics>,
}

impl MetricsCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_active(&self, city: &str, active_rides: u64) -> CityMetrics {
        self.update(city, |m| m.active_rides = active_rides)
    }

    pub fn on_completed(&self, city: &str, rides_completed: u64) -> CityMetrics {
        self.update(city, |m| m.rides_completed = rides_completed)
    }

    pub fn on_average(&self, city: &str, avg_duration: f64) -> CityMetrics {
        self.update(city, |m| m.avg_duration = avg_duration)
    }

    pub fn get(&self, city: &str) -> CityMetrics {
        self.latest.get(city).map(|m| *m).unwrap_or_default()
    }

    /// Loads a composite for `city` without reporting it.
    pub fn seed(&self, city: &str, metrics: CityMetrics) {
        self.latest.insert(city.to_string(), metrics);
    }

    fn update(&self, city: &str, apply: impl FnOnce(&mut CityMetrics)) -> CityMetrics {
        let mut metrics = self.latest.entry(city.to_string()).or_default();
        apply(&mut metrics);
        *metrics
    }
}
