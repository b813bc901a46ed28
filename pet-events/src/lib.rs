//! # Pet Events
//!
//! Domain event pipeline shared by the Pet Foundation services: the envelope
//! written to the broker, the typed events the adoption platform publishes,
//! the publisher, and the broker topology the notification service consumes
//! from.
//!
//! ## Overview
//!
//! The pet-events crate handles:
//! - **Envelope**: Versioned, timestamped wire message (`event`, `data`, `occurredAt`, `version`)
//! - **Domain Events**: `PetCreated`, `AdoptionRequestCreated`, `AdoptionStatusChanged`
//! - **Publisher**: Lazily connected, exchange declared once, persistent delivery
//! - **Topology**: One durable fanout exchange bound to one durable queue
//! - **Targeting**: Decides whether an event addresses one user or everyone
//!
//! ## Features
//!
//! - `memory` (default): In-process broker for tests and single-process deployments
//! - `amqp` (default): RabbitMQ backend built on `lapin`
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust,no_run
//! use pet_events::{BrokerPublisher, EventPublisher, MemoryBroker, Topology};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! async fn publish_example() {
//!     let broker = MemoryBroker::new();
//!     let publisher = BrokerPublisher::new(
//!         Arc::new(broker),
//!         Topology::new("petfoundation.events", "petfoundation.notifications"),
//!     );
//!
//!     publisher
//!         .publish("PetCreated", Some(json!({"Pet": {"id": 1, "name": "Luna"}})))
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ### Resolving the Target User
//!
//! ```rust
//! use pet_events::resolve_target_user_id;
//! use serde_json::json;
//!
//! let data = json!({"AdoptionRequest": {"UserId": 7}, "TargetUserId": 42});
//! assert_eq!(resolve_target_user_id(Some(&data)).as_deref(), Some("42"));
//! ```
//!
//! ## Event Names
//!
//! | event | data | delivered to |
//! |---|---|---|
//! | `PetCreated` | `{ Pet: { id, name, .. } }` | everyone |
//! | `AdoptionRequestCreated` | `{ AdoptionRequest: { .. } }` | everyone (records for admins) |
//! | `AdoptionStatusChanged` | `{ AdoptionRequest: { UserId, status, .. }, TargetUserId }` | the requesting user |
//!
//! Names are matched ignoring ASCII case. Unrecognized names are still
//! forwarded to every connected client.

pub mod broker;
pub mod config;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod publisher;
pub mod targeting;
pub mod topology;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

// Re-export main types
pub use broker::{BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, MessageProperties};
pub use config::BrokerConfig;
pub use envelope::{Envelope, ENVELOPE_VERSION};
pub use error::{EventError, EventResult};
pub use payload::{
    AdoptionRequestInfo, AdoptionRequestSnapshot, AdoptionStatus, DomainEvent, EventKind,
    EventPayload, PetInfo, PetSnapshot,
};
pub use publisher::{BrokerPublisher, EventPublisher};
pub use targeting::resolve_target_user_id;
pub use topology::{ExchangeKind, ExchangeSpec, QueueSpec, Topology};

#[cfg(feature = "memory")]
pub use memory::{MemoryBroker, MemoryBrokerStats, PublishedMessage};

#[cfg(feature = "amqp")]
pub use amqp::AmqpConnector;
