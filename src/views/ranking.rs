//! Global top-N ranking of cities by active rides.
//!
//! This is the one view that is not per key. Every city's gauge change goes
//! through the same mutex, which guards both the upsert and the re-rank.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCount {
    pub city: String,
    pub count: u64,
}

impl CityCount {
    pub fn new(city: &str, count: u64) -> Self {
        Self {
            city: city.to_string(),
            count,
        }
    }
}

/// One derived ranking. `revision` increases with every ranker mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    pub revision: u64,
    pub cities: Vec<CityCount>,
}

/// Count descending, then city name ascending for ties.
pub fn rank_order(a: &CityCount, b: &CityCount) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.city.cmp(&b.city))
}

/// Sorts `counts` with [`rank_order`] and keeps the first `capacity`.
pub fn top_cities<'a>(
    counts: impl IntoIterator<Item = (&'a String, &'a u64)>,
    capacity: usize,
) -> Vec<CityCount> {
    let mut ranked: Vec<CityCount> = counts
        .into_iter()
        .map(|(city, count)| CityCount::new(city, *count))
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(capacity);
    ranked
}

#[derive(Debug, Default)]
struct RankerState {
    counts: HashMap<String, u64>,
    revision: u64,
}

#[derive(Debug)]
pub struct TopCitiesRanker {
    capacity: usize,
    state: Mutex<RankerState>,
}

impl Default for TopCitiesRanker {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

impl TopCitiesRanker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(RankerState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records the latest active count for `city` and returns the full
    /// ranking, whether or not membership changed. A zero count removes the
    /// city.
    pub fn update(&self, city: &str, count: u64) -> Ranking {
        let mut state = self.state.lock();

        if count == 0 {
            state.counts.remove(city);
        } else {
            state.counts.insert(city.to_string(), count);
        }
        state.revision += 1;

        Ranking {
            revision: state.revision,
            cities: top_cities(&state.counts, self.capacity),
        }
    }

    pub fn current(&self) -> Ranking {
        let state = self.state.lock();
        Ranking {
            revision: state.revision,
            cities: top_cities(&state.counts, self.capacity),
        }
    }

    /// Number of cities with a non-zero count, ranked or not.
    pub fn tracked(&self) -> usize {
        self.state.lock().counts.len()
    }

    /// Replaces all tracked counts without bumping the revision.
    pub fn seed(&self, counts: impl IntoIterator<Item = (String, u64)>) {
        let mut state = self.state.lock();
        state.counts = counts.into_iter().filter(|(_, c)| *c > 0).collect();
    }
}
