//! Synthetic ride event generator for demos and load.

use chrono::Local;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::event::{EventType, RideEvent};

pub const DEFAULT_CITIES: [&str; 4] = ["Bangalore", "Hyderabad", "Mumbai", "Delhi"];

/// Upper bound for generated ride durations. Above the default anomaly
/// threshold so long rides show up in demo output.
pub const DEFAULT_MAX_DURATION_MINUTES: u32 = 90;

pub struct RideEventGenerator {
    cities: Vec<String>,
    max_duration_minutes: u32,
    rng: StdRng,
}

impl Default for RideEventGenerator {
    fn default() -> Self {
        Self::new(
            DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            DEFAULT_MAX_DURATION_MINUTES,
        )
    }
}

impl RideEventGenerator {
    pub fn new(cities: Vec<String>, max_duration_minutes: u32) -> Self {
        Self::with_rng(cities, max_duration_minutes, StdRng::from_entropy())
    }

    /// Deterministic generator for reproducible runs.
    pub fn seeded(cities: Vec<String>, max_duration_minutes: u32, seed: u64) -> Self {
        Self::with_rng(cities, max_duration_minutes, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cities: Vec<String>, max_duration_minutes: u32, rng: StdRng) -> Self {
        let cities = if cities.is_empty() {
            DEFAULT_CITIES.iter().map(|c| c.to_string()).collect()
        } else {
            cities
        };
        Self {
            cities,
            max_duration_minutes: max_duration_minutes.max(1),
            rng,
        }
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// A random event type in a random city.
    pub fn next_event(&mut self) -> RideEvent {
        let event_type = EventType::ALL
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(EventType::Requested);
        let city = self
            .cities
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        self.event(event_type, &city)
    }

    pub fn event(&mut self, event_type: EventType, city: &str) -> RideEvent {
        let completed = event_type == EventType::Completed;
        let rng = &mut self.rng;

        RideEvent {
            event_type,
            ride_id: Uuid::new_v4().to_string(),
            city: city.to_string(),
            driver_id: Some(format!("DRIVER-{}", rng.gen_range(0..100))),
            rider_id: Some(format!("RIDER-{}", rng.gen_range(0..1000))),
            timestamp: Some(Local::now().naive_local()),
            latitude: Some(20.0 + rng.r#gen::<f64>() * 15.0),
            longitude: Some(75.0 + rng.r#gen::<f64>() * 10.0),
            fare_estimate: Some(10.0 + rng.r#gen::<f64>() * 90.0),
            duration_minutes: completed
                .then(|| rng.gen_range(1..=self.max_duration_minutes)),
            distance: completed.then(|| rng.r#gen::<f64>() * 30.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cities() -> Vec<String> {
        vec!["Pune".to_string(), "Delhi".to_string()]
    }

    #[test]
    fn test_only_completed_rides_have_duration() {
        let mut generator = RideEventGenerator::seeded(cities(), 90, 7);
        for _ in 0..200 {
            let event = generator.next_event();
            assert_eq!(event.duration_minutes.is_some(), event.is_completed());
            assert_eq!(event.distance.is_some(), event.is_completed());
            if let Some(d) = event.duration_minutes {
                assert!((1..=90).contains(&d));
            }
            assert!(event.city == "Pune" || event.city == "Delhi");
        }
    }

    #[test]
    fn test_seeded_generators_agree_on_shape() {
        let mut a = RideEventGenerator::seeded(cities(), 90, 42);
        let mut b = RideEventGenerator::seeded(cities(), 90, 42);
        for _ in 0..20 {
            let (x, y) = (a.next_event(), b.next_event());
            assert_eq!(x.event_type, y.event_type);
            assert_eq!(x.city, y.city);
            assert_eq!(x.duration_minutes, y.duration_minutes);
        }
    }

    #[test]
    fn test_empty_city_list_falls_back_to_defaults() {
        let generator = RideEventGenerator::new(Vec::new(), 0);
        assert_eq!(generator.cities().len(), DEFAULT_CITIES.len());
    }
}
