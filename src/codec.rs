//! JSON codec for ride events.

use crate::error::{PipelineError, Result};
use crate::event::{RideEvent, SequencedEvent};

/// Decodes one JSON-encoded [`RideEvent`] and tags it with its log offset.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedMessage`] if the bytes are not valid JSON
/// or a required field (`eventType`, `rideId`, `city`) is missing.
pub fn decode_event(offset: u64, bytes: &[u8]) -> Result<SequencedEvent> {
    let event: RideEvent =
        serde_json::from_slice(bytes).map_err(|e| PipelineError::MalformedMessage {
            offset,
            reason: e.to_string(),
        })?;

    if event.city.trim().is_empty() {
        return Err(PipelineError::MalformedMessage {
            offset,
            reason: "empty city".to_string(),
        });
    }

    Ok(SequencedEvent::new(offset, event))
}

/// Encodes an event as a single JSON line (no trailing newline).
pub fn encode_event(event: &RideEvent) -> anyhow::Result<String> {
    Ok(serde_json::to_string(event)?)
}
