//! Consumer-side dashboard projection.
//!
//! Folds the notification stream back into a small read model: per-city
//! active counts, the latest average duration, and the time of the last
//! message. Reads vastly outnumber writes, so the city map sits behind a
//! read-write lock and the scalars are atomics. A ranking replaces the whole
//! map under one write guard, so readers never see it half rebuilt.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::notify::Notification;
use crate::views::ranking::{DEFAULT_TOP_N, top_cities};
use crate::views::CityCount;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Sum of active rides across every city currently tracked.
    pub active_rides: u64,
    pub average_duration: f64,
    pub top_cities: Vec<CityCount>,
    pub timestamp: DateTime<Utc>,
}

pub struct DashboardProjection {
    city_active_rides: RwLock<HashMap<String, u64>>,
    average_duration_bits: AtomicU64,
    last_update_millis: AtomicI64,
}

impl Default for DashboardProjection {
    fn default() -> Self {
        Self {
            city_active_rides: RwLock::new(HashMap::new()),
            average_duration_bits: AtomicU64::new(0f64.to_bits()),
            last_update_millis: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }
}

impl DashboardProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and applies one raw message. Undecodable input is logged and
    /// leaves the projection untouched.
    pub fn ingest(&self, payload: &str) {
        match serde_json::from_str::<Notification>(payload) {
            Ok(notification) => self.apply(&notification),
            Err(e) => error!(error = %e, payload, "Error processing analytics message"),
        }
    }

    pub fn apply(&self, notification: &Notification) {
        match notification {
            Notification::TopActiveCities { cities, .. } => {
                let replacement: HashMap<String, u64> = cities
                    .iter()
                    .map(|entry| (entry.city.clone(), entry.count))
                    .collect();
                *self.city_active_rides.write() = replacement;
            }
            Notification::CityActiveRides {
                city, active_rides, ..
            } => {
                self.city_active_rides
                    .write()
                    .insert(city.clone(), *active_rides);
            }
            Notification::Metrics { avg_duration, .. } => {
                self.average_duration_bits
                    .store(avg_duration.to_bits(), Ordering::Release);
            }
            Notification::Anomaly {
                city,
                ride_id,
                duration,
                ..
            } => {
                warn!(%city, %ride_id, duration, "ANOMALY DETECTED");
            }
        }
        self.last_update_millis
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    pub fn average_duration(&self) -> f64 {
        f64::from_bits(self.average_duration_bits.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let counts: Vec<(String, u64)> = self
            .city_active_rides
            .read()
            .iter()
            .map(|(city, count)| (city.clone(), *count))
            .collect();
        let active_rides: u64 = counts.iter().map(|(_, c)| c).sum();
        let top = top_cities(counts.iter().map(|(city, count)| (city, count)), DEFAULT_TOP_N);

        let millis = self.last_update_millis.load(Ordering::Acquire);
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now);

        DashboardSnapshot {
            active_rides,
            average_duration: self.average_duration(),
            top_cities: top,
            timestamp,
        }
    }

    pub fn reset(&self) {
        self.city_active_rides.write().clear();
        self.average_duration_bits
            .store(0f64.to_bits(), Ordering::Release);
        self.last_update_millis
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }
}

/// Publishes a snapshot on `tx` every `every` until the task is aborted.
pub fn spawn_publisher(
    projection: Arc<DashboardProjection>,
    every: Duration,
    tx: broadcast::Sender<DashboardSnapshot>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let snapshot = projection.snapshot();
            if tx.send(snapshot).is_err() {
                debug!("No dashboard subscribers");
            }
        }
    })
}
