//! Active ride gauge per city.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::event::{EventType, RideEvent};

/// How a city's active ride count is derived from lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveRidePolicy {
    /// `STARTED` adds one, `COMPLETED` removes one, never below zero.
    #[default]
    StartComplete,
    /// Every `REQUESTED` or `STARTED` event adds one; nothing removes.
    RequestedStarted,
}

impl fmt::Display for ActiveRidePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveRidePolicy::StartComplete => f.write_str("start-complete"),
            ActiveRidePolicy::RequestedStarted => f.write_str("requested-started"),
        }
    }
}

impl FromStr for ActiveRidePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start-complete" => Ok(ActiveRidePolicy::StartComplete),
            "requested-started" => Ok(ActiveRidePolicy::RequestedStarted),
            other => Err(format!("unknown active ride policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveRideTracker {
    policy: ActiveRidePolicy,
}

impl ActiveRideTracker {
    pub fn new(policy: ActiveRidePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ActiveRidePolicy {
        self.policy
    }

    /// Whether `event` takes part in the gauge at all.
    pub fn admits(&self, event: &RideEvent) -> bool {
        match self.policy {
            ActiveRidePolicy::StartComplete => matches!(
                event.event_type,
                EventType::Started | EventType::Completed
            ),
            ActiveRidePolicy::RequestedStarted => matches!(
                event.event_type,
                EventType::Requested | EventType::Started
            ),
        }
    }

    /// Next gauge value after `event`. Callers filter with [`Self::admits`].
    pub fn reduce(&self, count: u64, event: &RideEvent) -> u64 {
        match (self.policy, event.event_type) {
            (ActiveRidePolicy::StartComplete, EventType::Started) => count + 1,
            // Clamped so duplicate or out-of-order completions cannot go negative.
            (ActiveRidePolicy::StartComplete, EventType::Completed) => count.saturating_sub(1),
            (ActiveRidePolicy::RequestedStarted, EventType::Requested | EventType::Started) => {
                count + 1
            }
            _ => count,
        }
    }
}
