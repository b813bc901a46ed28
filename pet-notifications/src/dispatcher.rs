//! Event dispatcher.
//!
//! Turns one consumed envelope into notification records and a real-time
//! push. Persistence and delivery failures are logged and contained here so
//! a bad message or a store outage never stops the consume loop.

use crate::gateway::RealtimeGateway;
use crate::store::{NewNotification, NotificationStore, NotificationType};
use pet_auth::ADMIN_ROLE;
use pet_events::{resolve_target_user_id, Envelope, EventKind, EventPayload};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Pet name used when a `PetCreated` payload carries none.
pub const FALLBACK_PET_NAME: &str = "A new pet";

/// Status phrase used when an `AdoptionStatusChanged` payload carries none.
pub const FALLBACK_STATUS: &str = "updated";

/// Where a real-time push went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Every connection of one user
    User(String),
    /// Every live connection
    All,
}

/// Why a message was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Bytes were not a JSON envelope
    Malformed(String),
    /// Envelope had an empty event name
    MissingEventName,
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was persisted or delivered
    Dropped(DropReason),
    /// The envelope was handled
    Dispatched {
        /// Event name as received
        event: String,
        /// Notification records created
        records_created: usize,
        /// Real-time routing
        delivery: Delivery,
        /// Connections reached
        reached: usize,
    },
}

/// Routes envelopes to the notification store and the real-time gateway.
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    gateway: Arc<dyn RealtimeGateway>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(store: Arc<dyn NotificationStore>, gateway: Arc<dyn RealtimeGateway>) -> Self {
        Self { store, gateway }
    }

    /// Decode raw broker bytes and dispatch them.
    pub async fn handle_bytes(&self, body: &[u8]) -> DispatchOutcome {
        match Envelope::from_bytes(body) {
            Ok(envelope) => self.dispatch(&envelope).await,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(body),
                    "Dropping undecodable message"
                );
                DispatchOutcome::Dropped(DropReason::Malformed(e.to_string()))
            }
        }
    }

    /// Persist notifications for an envelope and push it to clients.
    pub async fn dispatch(&self, envelope: &Envelope) -> DispatchOutcome {
        if !envelope.has_event_name() {
            warn!(version = envelope.version(), "Dropping envelope without event name");
            return DispatchOutcome::Dropped(DropReason::MissingEventName);
        }

        let event = envelope.event();
        info!(event = %event, occurred_at = %envelope.occurred_at(), "Event received");

        let kind = EventKind::from_name(event);

        let target = match kind {
            Some(EventKind::AdoptionStatusChanged) => resolve_target_user_id(envelope.data()),
            _ => None,
        };

        let records_created = match kind {
            Some(_) if envelope.is_future_version() => {
                debug!(
                    event = %event,
                    version = envelope.version(),
                    "Envelope version not understood, delivering without persistence"
                );
                0
            }
            Some(kind) => self.persist(kind, envelope, target.as_deref()).await,
            None => 0,
        };

        let (delivery, reached) = match target {
            Some(user_id) => {
                let reached = self
                    .gateway
                    .deliver_to_user(&user_id, event, envelope.data())
                    .await;
                (Delivery::User(user_id), reached)
            }
            None => {
                let reached = self.gateway.deliver_to_all(event, envelope.data()).await;
                (Delivery::All, reached)
            }
        };

        DispatchOutcome::Dispatched {
            event: event.to_string(),
            records_created,
            delivery,
            reached,
        }
    }

    async fn persist(&self, kind: EventKind, envelope: &Envelope, target: Option<&str>) -> usize {
        let payload = EventPayload::decode(envelope);

        match kind {
            EventKind::PetCreated => {
                let pet_name = payload.pet_name().unwrap_or(FALLBACK_PET_NAME);
                let message = format!("{} is available for adoption", pet_name);

                let users = match self.store.list_all_users().await {
                    Ok(users) => users,
                    Err(e) => {
                        error!(event = %kind, error = %e, "Failed to list users");
                        return 0;
                    }
                };
                let user_ids: Vec<i64> = users.iter().map(|u| u.id).collect();
                let created = self
                    .create_for_each(&user_ids, NotificationType::NewPet, &message)
                    .await;
                info!(event = %kind, recipients = user_ids.len(), created, "New pet notifications created");
                created
            }
            EventKind::AdoptionStatusChanged => {
                let Some(target) = target else {
                    debug!(event = %kind, "No target user, skipping persistence");
                    return 0;
                };
                let Ok(user_id) = target.trim().parse::<i64>() else {
                    warn!(event = %kind, user_id = %target, "Target is not a domain user id, skipping persistence");
                    return 0;
                };

                let status = payload
                    .adoption_status()
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| FALLBACK_STATUS.to_string());
                let message = format!("Your adoption request has been {}", status);

                let created = self
                    .create_for_each(&[user_id], NotificationType::AdoptionStatus, &message)
                    .await;
                if created > 0 {
                    info!(event = %kind, user_id, "Adoption status notification created");
                }
                created
            }
            EventKind::AdoptionRequestCreated => {
                let admins = match self.store.list_users_by_role(ADMIN_ROLE).await {
                    Ok(admins) => admins,
                    Err(e) => {
                        error!(event = %kind, error = %e, "Failed to list administrators");
                        return 0;
                    }
                };
                let admin_ids: Vec<i64> = admins.iter().map(|u| u.id).collect();
                let created = self
                    .create_for_each(
                        &admin_ids,
                        NotificationType::NewRequest,
                        "There is a new adoption request pending",
                    )
                    .await;
                info!(event = %kind, recipients = admin_ids.len(), created, "New request notifications created");
                created
            }
        }
    }

    async fn create_for_each(&self, user_ids: &[i64], kind: NotificationType, message: &str) -> usize {
        let mut created = 0;
        for &user_id in user_ids {
            match self
                .store
                .create_notification(NewNotification::new(user_id, kind, message))
                .await
            {
                Ok(_) => created += 1,
                Err(e) => {
                    error!(user_id, notification_type = %kind, error = %e, "Failed to persist notification");
                }
            }
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ConnectionRegistry;
    use crate::store::{MemoryNotificationStore, UserProfile};
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryNotificationStore>,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryNotificationStore::with_users([
            UserProfile::new(1, "id-1", "Ana").with_role("Admin"),
            UserProfile::new(2, "id-2", "Luis").with_role("User"),
            UserProfile::new(3, "id-3", "Marta").with_role("User"),
        ]));
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(store.clone(), registry.clone());
        Fixture {
            store,
            registry,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_pet_created_notifies_every_user() {
        let f = fixture();
        let envelope = Envelope::new("PetCreated", Some(json!({"Pet": {"id": 4, "name": "Luna"}})));

        let outcome = f.dispatcher.dispatch(&envelope).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 3, delivery: Delivery::All, .. }
        ));
        let notifications = f.store.notifications().await;
        assert!(notifications.iter().all(|n| n.kind == NotificationType::NewPet));
        assert_eq!(notifications[0].message, "Luna is available for adoption");
    }

    #[tokio::test]
    async fn test_pet_created_fallback_name() {
        let f = fixture();
        f.dispatcher
            .dispatch(&Envelope::new("petcreated", Some(json!({"Pet": {"id": 4}}))))
            .await;

        let notifications = f.store.notifications().await;
        assert_eq!(notifications.len(), 3);
        assert_eq!(notifications[0].message, "A new pet is available for adoption");
    }

    #[tokio::test]
    async fn test_one_failing_user_does_not_stop_others() {
        let f = fixture();
        f.store.fail_creates_for(2).await;

        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new("PetCreated", Some(json!({"Pet": {"name": "Luna"}}))))
            .await;

        assert!(matches!(outcome, DispatchOutcome::Dispatched { records_created: 2, .. }));
        let users: Vec<i64> = f.store.notifications().await.iter().map(|n| n.user_id).collect();
        assert_eq!(users, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_status_changed_targets_user() {
        let f = fixture();
        let mut target = f.registry.on_connect(Some("2".to_string())).await;
        let mut bystander = f.registry.on_connect(Some("3".to_string())).await;
        target.outbound.recv().await.unwrap();
        bystander.outbound.recv().await.unwrap();

        let data = json!({"AdoptionRequest": {"UserId": 2, "status": "Approved"}, "TargetUserId": 2});
        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new("AdoptionStatusChanged", Some(data.clone())))
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched {
                event: "AdoptionStatusChanged".to_string(),
                records_created: 1,
                delivery: Delivery::User("2".to_string()),
                reached: 1,
            }
        );
        let frame = target.outbound.recv().await.unwrap();
        assert_eq!(frame.event, "AdoptionStatusChanged");
        assert_eq!(frame.data, Some(data));
        assert!(bystander.outbound.try_recv().is_err());

        let notifications = f.store.notifications_for_user(2).await;
        assert_eq!(notifications[0].kind, NotificationType::AdoptionStatus);
        assert_eq!(notifications[0].message, "Your adoption request has been approved");
    }

    #[tokio::test]
    async fn test_status_changed_non_numeric_target_delivers_without_record() {
        let f = fixture();
        let mut client = f.registry.on_connect(Some("abc-123".to_string())).await;
        client.outbound.recv().await.unwrap();

        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new(
                "AdoptionStatusChanged",
                Some(json!({"TargetUserId": "abc-123"})),
            ))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 0, reached: 1, .. }
        ));
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_changed_without_target_broadcasts() {
        let f = fixture();
        let _a = f.registry.on_connect(None).await;
        let _b = f.registry.on_connect(Some("3".to_string())).await;

        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new("AdoptionStatusChanged", Some(json!({"TargetUserId": ""}))))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 0, delivery: Delivery::All, reached: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_status_fallback_phrase() {
        let f = fixture();
        f.dispatcher
            .dispatch(&Envelope::new(
                "AdoptionStatusChanged",
                Some(json!({"AdoptionRequest": {"UserId": 3}})),
            ))
            .await;

        let notifications = f.store.notifications_for_user(3).await;
        assert_eq!(notifications[0].message, "Your adoption request has been updated");
    }

    #[tokio::test]
    async fn test_request_created_notifies_admins_only() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new(
                "AdoptionRequestCreated",
                Some(json!({"AdoptionRequest": {"UserId": 2, "status": "Pending"}})),
            ))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 1, delivery: Delivery::All, .. }
        ));
        let notifications = f.store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, 1);
        assert_eq!(notifications[0].kind, NotificationType::NewRequest);
    }

    #[tokio::test]
    async fn test_unknown_event_broadcast_without_records() {
        let f = fixture();
        let mut client = f.registry.on_connect(None).await;
        client.outbound.recv().await.unwrap();

        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new("PetAdopted", Some(json!({"Pet": {"id": 1}}))))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 0, delivery: Delivery::All, reached: 1, .. }
        ));
        assert_eq!(client.outbound.recv().await.unwrap().event, "PetAdopted");
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_event_dropped() {
        let f = fixture();
        let mut client = f.registry.on_connect(None).await;
        client.outbound.recv().await.unwrap();

        let outcome = f.dispatcher.handle_bytes(br#"{"event":"  ","data":{}}"#).await;

        assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::MissingEventName));
        assert!(client.outbound.try_recv().is_err());
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bytes_dropped() {
        let f = fixture();
        let outcome = f.dispatcher.handle_bytes(b"not json").await;
        assert!(matches!(outcome, DispatchOutcome::Dropped(DropReason::Malformed(_))));
    }

    #[tokio::test]
    async fn test_directory_outage_still_delivers() {
        let f = fixture();
        let _client = f.registry.on_connect(None).await;
        f.store.set_directory_available(false);

        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new("PetCreated", Some(json!({"Pet": {"name": "Luna"}}))))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 0, reached: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_future_version_delivered_without_records() {
        let f = fixture();
        let body = br#"{"event":"PetCreated","data":{"Pet":{"name":"Luna"}},"version":2}"#;

        let outcome = f.dispatcher.handle_bytes(body).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 0, delivery: Delivery::All, .. }
        ));
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_future_version_status_change_stays_targeted() {
        let f = fixture();
        let mut target = f.registry.on_connect(Some("2".to_string())).await;
        let mut bystander = f.registry.on_connect(Some("3".to_string())).await;
        target.outbound.recv().await.unwrap();
        bystander.outbound.recv().await.unwrap();

        let body = br#"{"event":"AdoptionStatusChanged","data":{"AdoptionRequest":{"UserId":2,"status":"Approved"},"TargetUserId":2},"version":2}"#;
        let outcome = f.dispatcher.handle_bytes(body).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched {
                event: "AdoptionStatusChanged".to_string(),
                records_created: 0,
                delivery: Delivery::User("2".to_string()),
                reached: 1,
            }
        );
        assert_eq!(target.outbound.recv().await.unwrap().event, "AdoptionStatusChanged");
        assert!(bystander.outbound.try_recv().is_err());
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_padded_event_name_not_recognized() {
        let f = fixture();
        let _client = f.registry.on_connect(None).await;

        let outcome = f
            .dispatcher
            .dispatch(&Envelope::new(" PetCreated ", Some(json!({"Pet": {"name": "Luna"}}))))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Dispatched { records_created: 0, delivery: Delivery::All, reached: 1, .. }
        ));
        assert!(f.store.notifications().await.is_empty());
    }
}
