//! Event envelope shared by publishers and subscribers.
//!
//! Every domain event travels over the broker wrapped in an [`Envelope`]:
//!
//! ```json
//! {
//!   "event": "AdoptionStatusChanged",
//!   "data": { "AdoptionRequest": { "UserId": 7, "status": "Approved" }, "TargetUserId": 7 },
//!   "occurredAt": "2024-05-01T12:00:00Z",
//!   "version": 1
//! }
//! ```

use crate::error::{EventError, EventResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Versioned, timestamped wrapper around an opaque event payload.
///
/// Fields are private so an envelope cannot be changed once built. Unknown
/// top-level fields are ignored when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Event name (e.g., "PetCreated")
    #[serde(default)]
    event: String,

    /// Event payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,

    /// Timestamp when the event was published
    #[serde(default = "Utc::now")]
    occurred_at: DateTime<Utc>,

    /// Envelope schema version
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    ENVELOPE_VERSION
}

impl Envelope {
    /// Create a new envelope stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `event` - The event name
    /// * `data` - The event payload, owned by the envelope from here on
    pub fn new(event: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            event: event.into(),
            data,
            occurred_at: Utc::now(),
            version: ENVELOPE_VERSION,
        }
    }

    /// Build an envelope from any serializable payload.
    ///
    /// The payload is converted into a fresh JSON tree, so later changes to
    /// the caller's value never reach the envelope.
    pub fn from_payload<T: Serialize + ?Sized>(
        event: impl Into<String>,
        payload: Option<&T>,
    ) -> EventResult<Self> {
        let data = payload
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| EventError::Serialization(e.to_string()))?;
        Ok(Self::new(event, data))
    }

    /// Event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Event payload, if any.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// Publish timestamp (UTC).
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Envelope schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the envelope names an event at all.
    ///
    /// Envelopes with an empty or whitespace-only name are dropped by
    /// consumers.
    pub fn has_event_name(&self) -> bool {
        !self.event.trim().is_empty()
    }

    /// Whether this envelope was produced by a newer schema than this build knows.
    pub fn is_future_version(&self) -> bool {
        self.version > ENVELOPE_VERSION
    }

    /// Serialize to the JSON bytes sent over the broker.
    pub fn to_bytes(&self) -> EventResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Decode an envelope from broker bytes.
    pub fn from_bytes(bytes: &[u8]) -> EventResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| EventError::Malformed(e.to_string()))
    }

    /// Parse the payload into a specific type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone().unwrap_or(serde_json::Value::Null))
    }
}
