//! # Pet Notifications
//!
//! Notification service for the Pet Foundation adoption platform.
//!
//! ## Overview
//!
//! The pet-notifications crate handles:
//! - **Subscriber**: Consumes the notification queue, one message at a time in broker order
//! - **Dispatcher**: Turns each domain event into per-user notification records and a live push
//! - **Store**: Notification persistence and the user directory behind a trait
//! - **Gateway**: Registry of live client connections with per-user and broadcast delivery
//! - **Hub**: WebSocket endpoint with bearer authentication and a `/health` endpoint
//!
//! ## Pipeline
//!
//! ```text
//! API ──publish──▶ fanout exchange ──▶ queue ──▶ EventSubscriber ──▶ Dispatcher
//!                                                                   │       │
//!                                                       NotificationStore  ConnectionRegistry ──▶ WebSocket clients
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pet_events::{MemoryBroker, Topology};
//! use pet_notifications::{ConnectionRegistry, Dispatcher, EventSubscriber, MemoryNotificationStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run() {
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         Arc::new(MemoryNotificationStore::new()),
//!         registry.clone(),
//!     ));
//!     let subscriber = EventSubscriber::new(
//!         Arc::new(MemoryBroker::new()),
//!         Topology::new("petfoundation.events", "petfoundation.notifications"),
//!         "pet-notifications",
//!         dispatcher,
//!     );
//!
//!     subscriber.run(CancellationToken::new()).await.unwrap();
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod store;
pub mod subscriber;

// Re-export main types
pub use config::NotificationsConfig;
pub use dispatcher::{Delivery, DispatchOutcome, Dispatcher, DropReason};
pub use error::{ConfigError, StoreError, StoreResult, SubscriberError, SubscriberResult};
pub use gateway::{
    ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionRegistry, Frame, RealtimeGateway,
    CONNECTED_EVENT, DEFAULT_OUTBOUND_CAPACITY,
};
pub use hub::{router, serve, HealthResponse, HubState};
pub use store::{
    MemoryNotificationStore, NewNotification, Notification, NotificationStore, NotificationType,
    UserProfile,
};
pub use subscriber::{EventSubscriber, SubscriberState, SubscriberStats};
