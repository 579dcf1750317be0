//! EventEnvelope: versioned wrapper around `Event` for the host callback.

use serde::Serialize;

use crate::event::Event;

/// Versioned envelope wrapping every event dispatched to the host.
///
/// Fields:
/// - `version`: Schema version (always 1 for now).
/// - `seq`: Sequence number per handle, starting at 1.
/// - `timestamp_ms`: UTC milliseconds when the envelope was created.
/// - `event`: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(seq: u64, event: Event) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}
