//! Ride lifecycle events as they arrive from the event log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Lifecycle stage reported by a [`RideEvent`].
///
/// Both the short names (`STARTED`) and the producer's prefixed names
/// (`RIDE_STARTED`) are accepted on input; the prefixed form is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "RIDE_REQUESTED", alias = "REQUESTED")]
    Requested,
    #[serde(rename = "RIDE_STARTED", alias = "STARTED")]
    Started,
    #[serde(rename = "RIDE_COMPLETED", alias = "COMPLETED")]
    Completed,
    #[serde(rename = "DRIVER_LOCATION_UPDATE")]
    DriverLocationUpdate,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Requested,
        EventType::Started,
        EventType::Completed,
        EventType::DriverLocationUpdate,
    ];
}

/// A single immutable ride lifecycle event. `city` is the partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideEvent {
    pub event_type: EventType,
    pub ride_id: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare_estimate: Option<f64>,
    /// Only present on completed rides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl RideEvent {
    /// Minimal event carrying only the fields the aggregation views read.
    pub fn new(event_type: EventType, ride_id: &str, city: &str) -> Self {
        RideEvent {
            event_type,
            ride_id: ride_id.to_string(),
            city: city.to_string(),
            driver_id: None,
            rider_id: None,
            timestamp: None,
            latitude: None,
            longitude: None,
            fare_estimate: None,
            duration_minutes: None,
            distance: None,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.event_type == EventType::Completed
    }
}

/// An event paired with its zero-based position in the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    pub offset: u64,
    pub event: RideEvent,
}

impl SequencedEvent {
    pub fn new(offset: u64, event: RideEvent) -> Self {
        Self { offset, event }
    }

    pub fn city(&self) -> &str {
        &self.event.city
    }
}
