//! Domain event types and payload shapes.
//!
//! This module defines the events the adoption platform publishes and the
//! conventional `data` shape each one carries. Producers build payloads from
//! [`DomainEvent`]; consumers decode an envelope into an [`EventPayload`],
//! which falls back to [`EventPayload::Unknown`] for names it does not
//! recognize.

use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name for a newly listed pet.
pub const PET_CREATED: &str = "PetCreated";
/// Event name for a newly submitted adoption request.
pub const ADOPTION_REQUEST_CREATED: &str = "AdoptionRequestCreated";
/// Event name for an adoption request that was approved, rejected or cancelled.
pub const ADOPTION_STATUS_CHANGED: &str = "AdoptionStatusChanged";

/// Recognized event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A pet became available for adoption
    PetCreated,
    /// A user submitted an adoption request
    AdoptionRequestCreated,
    /// An adoption request changed status
    AdoptionStatusChanged,
}

impl EventKind {
    /// Match an event name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            EventKind::PetCreated,
            EventKind::AdoptionRequestCreated,
            EventKind::AdoptionStatusChanged,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Canonical event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PetCreated => PET_CREATED,
            EventKind::AdoptionRequestCreated => ADOPTION_REQUEST_CREATED,
            EventKind::AdoptionStatusChanged => ADOPTION_STATUS_CHANGED,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adoption request status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AdoptionStatus {
    /// Waiting for an administrator
    Pending,
    /// Approved by an administrator
    Approved,
    /// Rejected by an administrator
    Rejected,
    /// Withdrawn by the requesting user
    Cancelled,
}

impl AdoptionStatus {
    /// Status as written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdoptionStatus::Pending => "Pending",
            AdoptionStatus::Approved => "Approved",
            AdoptionStatus::Rejected => "Rejected",
            AdoptionStatus::Cancelled => "Cancelled",
        }
    }
}

// ============================================================================
// Producer side
// ============================================================================

/// Snapshot of a pet as carried in `PetCreated` payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PetSnapshot {
    /// Pet ID
    pub id: i64,
    /// Pet name
    pub name: String,
    /// Species (e.g., "Dog")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    /// Breed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    /// Current listing status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Snapshot of an adoption request as carried in adoption payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdoptionRequestSnapshot {
    /// Request ID
    pub id: i64,
    /// Requested pet
    #[serde(rename = "PetId")]
    pub pet_id: i64,
    /// Domain user who submitted the request
    #[serde(rename = "UserId")]
    pub user_id: i64,
    /// Current status
    pub status: AdoptionStatus,
    /// Applicant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Domain events published by the adoption platform.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Pet was created
    PetCreated { pet: PetSnapshot },
    /// Adoption request was created
    AdoptionRequestCreated { request: AdoptionRequestSnapshot },
    /// Adoption request was approved, rejected or cancelled
    AdoptionStatusChanged { request: AdoptionRequestSnapshot },
}

#[derive(Serialize)]
struct PetPayload<'a> {
    #[serde(rename = "Pet")]
    pet: &'a PetSnapshot,
}

#[derive(Serialize)]
struct AdoptionRequestPayload<'a> {
    #[serde(rename = "AdoptionRequest")]
    request: &'a AdoptionRequestSnapshot,
    #[serde(rename = "TargetUserId", skip_serializing_if = "Option::is_none")]
    target_user_id: Option<i64>,
}

impl DomainEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::PetCreated { .. } => EventKind::PetCreated,
            DomainEvent::AdoptionRequestCreated { .. } => EventKind::AdoptionRequestCreated,
            DomainEvent::AdoptionStatusChanged { .. } => EventKind::AdoptionStatusChanged,
        }
    }

    /// Build the conventional `data` payload for this event.
    ///
    /// Status changes carry an explicit `TargetUserId` so the notification
    /// service delivers them to the requesting user only.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            DomainEvent::PetCreated { pet } => serde_json::to_value(PetPayload { pet }),
            DomainEvent::AdoptionRequestCreated { request } => {
                serde_json::to_value(AdoptionRequestPayload {
                    request,
                    target_user_id: None,
                })
            }
            DomainEvent::AdoptionStatusChanged { request } => {
                serde_json::to_value(AdoptionRequestPayload {
                    request,
                    target_user_id: Some(request.user_id),
                })
            }
        }
    }
}

// ============================================================================
// Consumer side
// ============================================================================

/// Pet fields the notification service reads.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PetInfo {
    /// Pet name
    #[serde(default, alias = "Name")]
    pub name: Option<String>,
}

/// Adoption request fields the notification service reads.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AdoptionRequestInfo {
    /// Status text
    #[serde(default, alias = "Status")]
    pub status: Option<String>,
}

#[derive(Deserialize)]
struct PetEnvelopeData {
    #[serde(rename = "Pet")]
    pet: Option<PetInfo>,
}

#[derive(Deserialize)]
struct AdoptionEnvelopeData {
    #[serde(rename = "AdoptionRequest")]
    request: Option<AdoptionRequestInfo>,
}

/// Typed view of an envelope's payload.
///
/// Decoding is tolerant: a recognized event whose payload is missing or has
/// an unexpected shape decodes with `None` fields instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// `PetCreated`
    PetCreated { pet: Option<PetInfo> },
    /// `AdoptionRequestCreated`
    AdoptionRequestCreated { request: Option<AdoptionRequestInfo> },
    /// `AdoptionStatusChanged`
    AdoptionStatusChanged { request: Option<AdoptionRequestInfo> },
    /// Any other event name
    Unknown,
}

impl EventPayload {
    /// Decode the payload of an envelope according to its event name.
    pub fn decode(envelope: &Envelope) -> Self {
        match EventKind::from_name(envelope.event()) {
            Some(EventKind::PetCreated) => EventPayload::PetCreated {
                pet: envelope
                    .parse_data::<PetEnvelopeData>()
                    .ok()
                    .and_then(|d| d.pet),
            },
            Some(EventKind::AdoptionRequestCreated) => EventPayload::AdoptionRequestCreated {
                request: envelope
                    .parse_data::<AdoptionEnvelopeData>()
                    .ok()
                    .and_then(|d| d.request),
            },
            Some(EventKind::AdoptionStatusChanged) => EventPayload::AdoptionStatusChanged {
                request: envelope
                    .parse_data::<AdoptionEnvelopeData>()
                    .ok()
                    .and_then(|d| d.request),
            },
            None => EventPayload::Unknown,
        }
    }

    /// Pet name, when the payload carries one.
    pub fn pet_name(&self) -> Option<&str> {
        match self {
            EventPayload::PetCreated { pet: Some(pet) } => pet
                .name
                .as_deref()
                .filter(|name| !name.trim().is_empty()),
            _ => None,
        }
    }

    /// Adoption request status, when the payload carries one.
    pub fn adoption_status(&self) -> Option<&str> {
        match self {
            EventPayload::AdoptionRequestCreated { request: Some(r) }
            | EventPayload::AdoptionStatusChanged { request: Some(r) } => r
                .status
                .as_deref()
                .filter(|status| !status.trim().is_empty()),
            _ => None,
        }
    }
}
