//! Change notifications and their delivery.
//!
//! [`ChangeNotificationEmitter`] stamps each [`ViewUpdate`] with a timestamp,
//! encodes it as one of four tagged JSON messages and hands it to every
//! configured [`NotificationSink`]. Delivery is fire-and-forget: a failing
//! sink is logged and skipped, the update is not retried.

mod http;
mod sink;

pub use http::HttpSink;
pub use sink::{ChannelSink, JsonLinesSink, NotificationSink};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::engine::ViewUpdate;
use crate::error::PipelineError;
use crate::views::CityCount;

/// Wire message. The `type` field carries the discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    Metrics {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        city: Option<String>,
        active_rides: u64,
        rides_completed: u64,
        avg_duration: f64,
        timestamp: i64,
    },
    CityActiveRides {
        city: String,
        active_rides: u64,
        timestamp: i64,
    },
    TopActiveCities {
        cities: Vec<CityCount>,
        timestamp: i64,
    },
    Anomaly {
        city: String,
        ride_id: String,
        duration: u32,
        message: String,
        timestamp: i64,
    },
}

impl Notification {
    pub fn from_update(update: ViewUpdate, timestamp: i64) -> Self {
        match update {
            ViewUpdate::Metrics { city, metrics } => Notification::Metrics {
                city: Some(city),
                active_rides: metrics.active_rides,
                rides_completed: metrics.rides_completed,
                avg_duration: metrics.avg_duration,
                timestamp,
            },
            ViewUpdate::CityActiveRides { city, active_rides } => Notification::CityActiveRides {
                city,
                active_rides,
                timestamp,
            },
            ViewUpdate::TopActiveCities(ranking) => Notification::TopActiveCities {
                cities: ranking.cities,
                timestamp,
            },
            ViewUpdate::Anomaly(record) => Notification::Anomaly {
                city: record.city,
                ride_id: record.ride_id,
                duration: record.duration_minutes,
                message: record.message,
                timestamp,
            },
        }
    }

    /// The `type` discriminator as written on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Metrics { .. } => "METRICS",
            Notification::CityActiveRides { .. } => "CITY_ACTIVE_RIDES",
            Notification::TopActiveCities { .. } => "TOP_ACTIVE_CITIES",
            Notification::Anomaly { .. } => "ANOMALY",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Notification::Metrics { timestamp, .. }
            | Notification::CityActiveRides { timestamp, .. }
            | Notification::TopActiveCities { timestamp, .. }
            | Notification::Anomaly { timestamp, .. } => *timestamp,
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitterStats {
    pub delivered: u64,
    pub failed: u64,
    pub superseded: u64,
}

pub struct ChangeNotificationEmitter {
    sinks: Vec<Arc<dyn NotificationSink>>,
    clock: fn() -> i64,
    // Revision of the newest ranking written; older ones are dropped.
    ranking_revision: Mutex<u64>,
    delivered: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
}

impl ChangeNotificationEmitter {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self {
            sinks,
            clock: now_millis,
            ranking_revision: Mutex::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }
    }

    /// Replaces the epoch-millisecond clock used for `timestamp`.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub async fn emit_all(&self, updates: Vec<ViewUpdate>) {
        for update in updates {
            self.emit(update).await;
        }
    }

    pub async fn emit(&self, update: ViewUpdate) {
        if let ViewUpdate::TopActiveCities(ranking) = &update {
            // Held across delivery so rankings reach sinks in revision order.
            let mut last = self.ranking_revision.lock().await;
            if ranking.revision <= *last {
                self.superseded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    revision = ranking.revision,
                    newest = *last,
                    "Dropping superseded ranking"
                );
                return;
            }
            *last = ranking.revision;
            // Stamped under the lock so ranking timestamps follow delivery order.
            let notification = Notification::from_update(update, (self.clock)());
            self.deliver(&notification).await;
            return;
        }

        let notification = Notification::from_update(update, (self.clock)());
        self.deliver(&notification).await;
    }

    async fn deliver(&self, notification: &Notification) {
        let payload = match serde_json::to_string(notification) {
            Ok(payload) => payload,
            Err(e) => {
                error!(kind = notification.kind(), error = %e, "Failed to encode notification");
                self.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        for sink in &self.sinks {
            match sink.send(notification, &payload).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(source) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    let e = PipelineError::Sink {
                        sink: sink.name(),
                        source,
                    };
                    warn!(
                        kind = notification.kind(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }
}
