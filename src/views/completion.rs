//! Completed ride count, total duration and the average derived from them.
//!
//! The two trackers are filtered differently on purpose: every completion
//! bumps the count, only completions with a duration add to the total.

use dashmap::DashMap;

use crate::event::RideEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionStatsTracker;

impl CompletionStatsTracker {
    pub fn admits_count(&self, event: &RideEvent) -> bool {
        event.is_completed()
    }

    pub fn admits_duration(&self, event: &RideEvent) -> bool {
        event.is_completed() && event.duration_minutes.is_some()
    }

    pub fn reduce_count(&self, count: u64, _event: &RideEvent) -> u64 {
        count + 1
    }

    pub fn reduce_duration(&self, total: u64, event: &RideEvent) -> u64 {
        total + u64::from(event.duration_minutes.unwrap_or(0))
    }
}

/// `total / count`, or 0.0 before the first completion.
pub fn average_duration(total_minutes: u64, completed: u64) -> f64 {
    if completed == 0 {
        0.0
    } else {
        total_minutes as f64 / completed as f64
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AverageInputs {
    total: u64,
    count: u64,
    average: Option<f64>,
}

/// Join of the total-duration and completed-count views.
///
/// Keeps the latest value seen from each side per city; a side that has not
/// reported a city yet reads as zero.
#[derive(Debug, Default)]
pub struct AverageDurationCombiner {
    inputs: DashMap<String, AverageInputs>,
}

impl AverageDurationCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// New total for `city`. Returns the average if it changed.
    pub fn on_total(&self, city: &str, total: u64) -> Option<f64> {
        self.recompute(city, |inputs| inputs.total = total)
    }

    /// New completed count for `city`. Returns the average if it changed.
    pub fn on_count(&self, city: &str, count: u64) -> Option<f64> {
        self.recompute(city, |inputs| inputs.count = count)
    }

    /// Current average for `city`; 0.0 for an unseen city.
    pub fn get(&self, city: &str) -> f64 {
        self.inputs
            .get(city)
            .map(|i| average_duration(i.total, i.count))
            .unwrap_or(0.0)
    }

    /// Loads both sides for `city` without reporting a change.
    pub fn seed(&self, city: &str, total: u64, count: u64) {
        self.inputs.insert(
            city.to_string(),
            AverageInputs {
                total,
                count,
                average: Some(average_duration(total, count)),
            },
        );
    }

    fn recompute(&self, city: &str, update: impl FnOnce(&mut AverageInputs)) -> Option<f64> {
        let mut inputs = self.inputs.entry(city.to_string()).or_default();
        update(&mut inputs);

        let average = average_duration(inputs.total, inputs.count);
        let changed = inputs
            .average
            .is_none_or(|previous| previous.to_bits() != average.to_bits());
        inputs.average = Some(average);

        changed.then_some(average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    #[test]
    fn test_completed_without_duration_counts_but_does_not_sum() {
        let tracker = CompletionStatsTracker;
        let event = RideEvent::new(EventType::Completed, "r1", "Delhi");

        assert!(tracker.admits_count(&event));
        assert!(!tracker.admits_duration(&event));
        assert_eq!(tracker.reduce_count(4, &event), 5);
    }

    #[test]
    fn test_other_event_types_are_ignored() {
        let tracker = CompletionStatsTracker;
        let event = RideEvent::new(EventType::Started, "r1", "Delhi").with_duration(20);
        assert!(!tracker.admits_count(&event));
        assert!(!tracker.admits_duration(&event));
    }

    #[test]
    fn test_fold_matches_sum_and_mean() {
        let tracker = CompletionStatsTracker;
        let durations = [12u32, 45, 3, 90, 61];
        let (mut count, mut total) = (0, 0);
        for d in durations {
            let event = RideEvent::new(EventType::Completed, "r", "Pune").with_duration(d);
            count = tracker.reduce_count(count, &event);
            total = tracker.reduce_duration(total, &event);
        }
        assert_eq!(count, 5);
        assert_eq!(total, 211);
        assert_eq!(average_duration(total, count), 211.0 / 5.0);
    }

    #[test]
    fn test_average_of_zero_completions_is_zero() {
        assert_eq!(average_duration(0, 0), 0.0);
        assert_eq!(average_duration(50, 0), 0.0);
    }

    #[test]
    fn test_combiner_defaults_missing_side_to_zero() {
        let combiner = AverageDurationCombiner::new();

        // total arrives first; count side has not seen the key yet
        assert_eq!(combiner.on_total("Mumbai", 30), Some(0.0));
        assert_eq!(combiner.on_count("Mumbai", 1), Some(30.0));
        assert_eq!(combiner.get("Mumbai"), 30.0);
        assert_eq!(combiner.get("Chennai"), 0.0);
    }

    #[test]
    fn test_combiner_reports_only_changes() {
        let combiner = AverageDurationCombiner::new();
        combiner.on_count("Mumbai", 2);
        assert_eq!(combiner.on_total("Mumbai", 120), Some(60.0));
        assert_eq!(combiner.on_count("Mumbai", 2), None);

        // a completion without duration lowers the average
        assert_eq!(combiner.on_count("Mumbai", 3), Some(40.0));
    }

    #[test]
    fn test_seed_is_silent() {
        let combiner = AverageDurationCombiner::new();
        combiner.seed("Delhi", 100, 4);
        assert_eq!(combiner.get("Delhi"), 25.0);
        assert_eq!(combiner.on_total("Delhi", 100), None);
    }
}
