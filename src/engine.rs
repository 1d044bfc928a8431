//! The aggregation dataflow graph.
//!
//! ```text
//! event ─┬─> ActiveRideTracker ──────┬─> TopCitiesRanker ─────────> TOP_ACTIVE_CITIES
//!        │                           ├──────────────────────────────> CITY_ACTIVE_RIDES
//!        │                           └─┐
//!        ├─> CompletionStatsTracker ───┼─> MetricsCombiner ─────────> METRICS
//!        │     └─> AverageDurationCombiner ─┘
//!        └─> AnomalyDetector ───────────────────────────────────────> ANOMALY
//! ```
//!
//! The per-city trackers fold into one [`CityAggregateState`] in a single
//! store reduce, so the active, completed and duration views for a city move
//! together. Combiners only ever see the post-reduce values.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::event::SequencedEvent;
use crate::store::{CityAggregateState, KeyedStore};
use crate::views::{
    ActiveRideTracker, AnomalyDetector, AnomalyRecord, AverageDurationCombiner, CityCount,
    CityMetrics, CompletionStatsTracker, MetricsCombiner, Ranking, TopCitiesRanker,
    average_duration,
};

/// A terminal view change, in the order it should reach the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    CityActiveRides { city: String, active_rides: u64 },
    TopActiveCities(Ranking),
    Metrics { city: String, metrics: CityMetrics },
    Anomaly(AnomalyRecord),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub processed: u64,
    pub already_applied: u64,
}

pub struct Engine {
    store: KeyedStore<CityAggregateState>,
    active: ActiveRideTracker,
    completion: CompletionStatsTracker,
    average: AverageDurationCombiner,
    metrics: MetricsCombiner,
    ranker: TopCitiesRanker,
    anomalies: AnomalyDetector,
    processed: AtomicU64,
    already_applied: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: KeyedStore::new(),
            active: ActiveRideTracker::new(config.active_policy),
            completion: CompletionStatsTracker,
            average: AverageDurationCombiner::new(),
            metrics: MetricsCombiner::new(),
            ranker: TopCitiesRanker::new(config.top_n),
            anomalies: AnomalyDetector::new(config.anomaly_threshold_minutes),
            processed: AtomicU64::new(0),
            already_applied: AtomicU64::new(0),
        }
    }

    /// Runs one event through every view and returns the resulting updates.
    ///
    /// Events for one city must be passed in log order from a single caller
    /// at a time; different cities may be processed concurrently. An event
    /// whose offset is already folded into its city's state leaves every
    /// stateful view untouched and can only yield an anomaly.
    pub fn process(&self, sequenced: &SequencedEvent) -> Vec<ViewUpdate> {
        let event = &sequenced.event;
        let city = event.city.as_str();

        let change = self
            .store
            .apply(city, sequenced, |state, sequenced| self.fold(state, sequenced));

        if change.before.has_applied(sequenced.offset) {
            self.already_applied.fetch_add(1, Ordering::Relaxed);
            trace!(city, offset = sequenced.offset, "Event already applied, skipping fold");
            // Anomalies are not deduplicated: a redelivered long ride is reported again.
            return self
                .anomalies
                .inspect(event)
                .map(ViewUpdate::Anomaly)
                .into_iter()
                .collect();
        }
        self.processed.fetch_add(1, Ordering::Relaxed);

        let (before, after) = (change.before, change.after);
        let mut updates = Vec::new();
        let mut composite = None;

        if after.active_count != before.active_count {
            updates.push(ViewUpdate::CityActiveRides {
                city: city.to_string(),
                active_rides: after.active_count,
            });
            updates.push(ViewUpdate::TopActiveCities(
                self.ranker.update(city, after.active_count),
            ));
            composite = Some(self.metrics.on_active(city, after.active_count));
        }

        if after.total_duration_minutes != before.total_duration_minutes {
            if let Some(avg) = self.average.on_total(city, after.total_duration_minutes) {
                composite = Some(self.metrics.on_average(city, avg));
            }
        }

        if after.completed_count != before.completed_count {
            composite = Some(self.metrics.on_completed(city, after.completed_count));
            if let Some(avg) = self.average.on_count(city, after.completed_count) {
                composite = Some(self.metrics.on_average(city, avg));
            }
        }

        if let Some(metrics) = composite {
            updates.push(ViewUpdate::Metrics {
                city: city.to_string(),
                metrics,
            });
        }

        if event.is_completed() && event.duration_minutes.is_none() {
            debug!(
                city,
                ride_id = %event.ride_id,
                offset = sequenced.offset,
                "Completed ride without duration, counted but not summed"
            );
        }

        if let Some(anomaly) = self.anomalies.inspect(event) {
            updates.push(ViewUpdate::Anomaly(anomaly));
        }

        updates
    }

    fn fold(&self, state: &CityAggregateState, sequenced: &SequencedEvent) -> CityAggregateState {
        if state.has_applied(sequenced.offset) {
            return *state;
        }

        let event = &sequenced.event;
        let mut next = *state;

        if self.active.admits(event) {
            next.active_count = self.active.reduce(next.active_count, event);
        }
        if self.completion.admits_count(event) {
            next.completed_count = self.completion.reduce_count(next.completed_count, event);
        }
        if self.completion.admits_duration(event) {
            next.total_duration_minutes = self
                .completion
                .reduce_duration(next.total_duration_minutes, event);
        }
        next.last_offset = Some(sequenced.offset);

        next
    }

    /// Replaces all state with a recovered per-city snapshot. Derived views
    /// are rebuilt from it without emitting anything.
    pub fn restore(&self, cities: BTreeMap<String, CityAggregateState>) {
        self.ranker
            .seed(cities.iter().map(|(city, s)| (city.clone(), s.active_count)));

        for (city, state) in &cities {
            self.average
                .seed(city, state.total_duration_minutes, state.completed_count);
            self.metrics.seed(
                city,
                CityMetrics {
                    active_rides: state.active_count,
                    rides_completed: state.completed_count,
                    avg_duration: average_duration(
                        state.total_duration_minutes,
                        state.completed_count,
                    ),
                },
            );
        }

        debug!(cities = cities.len(), "Engine state restored");
        self.store.restore(cities);
    }

    /// Per-city fold state suitable for a checkpoint.
    pub fn snapshot(&self) -> BTreeMap<String, CityAggregateState> {
        self.store.snapshot()
    }

    pub fn city_state(&self, city: &str) -> Option<CityAggregateState> {
        self.store.get(city)
    }

    pub fn city_metrics(&self, city: &str) -> CityMetrics {
        self.metrics.get(city)
    }

    pub fn average_duration(&self, city: &str) -> f64 {
        self.average.get(city)
    }

    pub fn top_cities(&self) -> Vec<CityCount> {
        self.ranker.current().cities
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            processed: self.processed.load(Ordering::Relaxed),
            already_applied: self.already_applied.load(Ordering::Relaxed),
        }
    }
}
