//! End-to-end tests for the notification pipeline.
//!
//! Events go through the real publisher, the in-memory broker, the
//! subscriber loop and the dispatcher, and come out as stored notifications
//! and frames on registered connections. No external broker is needed.
//!
//! Flows covered:
//! 1. Publish → consume round trip keeps event name and data
//! 2. `PetCreated` notifies every user, even when one insert fails
//! 3. `AdoptionStatusChanged` reaches only the requesting user
//! 4. `AdoptionRequestCreated` creates records for administrators only
//! 5. Empty and undecodable messages are dropped without stopping the loop

use pet_events::{
    AdoptionRequestSnapshot, AdoptionStatus, BrokerPublisher, DomainEvent, EventPublisher,
    MemoryBroker, PetSnapshot, Topology,
};
use pet_notifications::{
    ConnectionHandle, ConnectionRegistry, Dispatcher, EventSubscriber, Frame,
    MemoryNotificationStore, NotificationType, SubscriberError, SubscriberState, UserProfile,
    CONNECTED_EVENT,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EXCHANGE: &str = "petfoundation.events";
const QUEUE: &str = "petfoundation.notifications";

/// Running pipeline over an in-memory broker.
struct Pipeline {
    broker: MemoryBroker,
    publisher: BrokerPublisher,
    store: Arc<MemoryNotificationStore>,
    registry: Arc<ConnectionRegistry>,
    subscriber: Arc<EventSubscriber>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), SubscriberError>>,
}

impl Pipeline {
    /// Start a subscriber and wait until it consumes.
    async fn start(users: Vec<UserProfile>) -> Self {
        let broker = MemoryBroker::new();
        let store = Arc::new(MemoryNotificationStore::with_users(users));
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), registry.clone()));
        let subscriber = Arc::new(EventSubscriber::new(
            Arc::new(broker.clone()),
            Topology::new(EXCHANGE, QUEUE),
            "pipeline-tests",
            dispatcher,
        ));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let subscriber = subscriber.clone();
            let shutdown = shutdown.clone();
            async move { subscriber.run(shutdown).await }
        });

        let mut state = subscriber.watch_state();
        tokio::time::timeout(
            Duration::from_secs(1),
            state.wait_for(|s| *s == SubscriberState::Consuming),
        )
        .await
        .expect("subscriber did not start")
        .expect("subscriber state channel closed");

        let publisher = BrokerPublisher::new(Arc::new(broker.clone()), Topology::new(EXCHANGE, QUEUE));

        Self {
            broker,
            publisher,
            store,
            registry,
            subscriber,
            shutdown,
            task,
        }
    }

    /// Register a connection and consume its `Connected` acknowledgement.
    async fn connect(&self, user_id: Option<&str>) -> ConnectionHandle {
        let mut handle = self.registry.on_connect(user_id.map(str::to_string)).await;
        let ack = next_frame(&mut handle).await;
        assert_eq!(ack.event, CONNECTED_EVENT);
        handle
    }

    /// Wait until the subscriber has received `count` messages.
    async fn wait_received(&self, count: u64) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.subscriber.stats().received < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("messages were not consumed");
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
        assert_eq!(self.subscriber.state(), SubscriberState::Disconnected);
    }
}

async fn next_frame(handle: &mut ConnectionHandle) -> Frame {
    tokio::time::timeout(Duration::from_secs(1), handle.outbound.recv())
        .await
        .expect("no frame delivered")
        .expect("connection channel closed")
}

fn users() -> Vec<UserProfile> {
    vec![
        UserProfile::new(1, "identity-1", "Ana").with_role("Admin"),
        UserProfile::new(2, "identity-2", "Luis").with_role("User"),
        UserProfile::new(3, "identity-3", "Marta").with_role("User"),
    ]
}

fn request(user_id: i64, status: AdoptionStatus) -> AdoptionRequestSnapshot {
    AdoptionRequestSnapshot {
        id: 11,
        pet_id: 5,
        user_id,
        status,
        message: None,
    }
}

// ============================================================================
// Round trip
// ============================================================================

#[tokio::test]
async fn test_round_trip_preserves_event_and_data() {
    let pipeline = Pipeline::start(users()).await;
    let mut client = pipeline.connect(None).await;

    let data = json!({"Pet": {"id": 5, "name": "Luna", "tags": ["calm", "small"]}, "extra": null});
    pipeline
        .publisher
        .publish("PetCreated", Some(data.clone()))
        .await
        .unwrap();

    let frame = next_frame(&mut client).await;
    assert_eq!(frame.event, "PetCreated");
    assert_eq!(frame.data, Some(data));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_unknown_event_is_broadcast_without_records() {
    let pipeline = Pipeline::start(users()).await;
    let mut anonymous = pipeline.connect(None).await;
    let mut user = pipeline.connect(Some("2")).await;

    pipeline
        .publisher
        .publish("PetArchived", Some(json!({"PetId": 5})))
        .await
        .unwrap();

    assert_eq!(next_frame(&mut anonymous).await.event, "PetArchived");
    assert_eq!(next_frame(&mut user).await.event, "PetArchived");
    assert!(pipeline.store.notifications().await.is_empty());

    pipeline.stop().await;
}

// ============================================================================
// Persistence and targeting
// ============================================================================

#[tokio::test]
async fn test_pet_created_notifies_every_user_despite_failure() {
    let pipeline = Pipeline::start(users()).await;
    pipeline.store.fail_creates_for(2).await;
    let mut client = pipeline.connect(Some("3")).await;

    pipeline
        .publisher
        .publish_event(&DomainEvent::PetCreated {
            pet: PetSnapshot {
                id: 5,
                name: "Luna".to_string(),
                species: Some("Dog".to_string()),
                breed: None,
                status: None,
            },
        })
        .await
        .unwrap();

    assert_eq!(next_frame(&mut client).await.event, "PetCreated");

    let stored = pipeline.store.notifications().await;
    let mut recipients: Vec<i64> = stored.iter().map(|n| n.user_id).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec![1, 3]);
    assert!(stored
        .iter()
        .all(|n| n.kind == NotificationType::NewPet && n.message == "Luna is available for adoption"));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_status_change_reaches_only_target_user() {
    let pipeline = Pipeline::start(users()).await;
    let mut phone = pipeline.connect(Some("2")).await;
    let mut laptop = pipeline.connect(Some("2")).await;
    let mut other = pipeline.connect(Some("3")).await;
    let mut anonymous = pipeline.connect(None).await;

    pipeline
        .publisher
        .publish_event(&DomainEvent::AdoptionStatusChanged {
            request: request(2, AdoptionStatus::Approved),
        })
        .await
        .unwrap();

    let frame = next_frame(&mut phone).await;
    assert_eq!(frame.event, "AdoptionStatusChanged");
    assert_eq!(frame.data.as_ref().unwrap()["TargetUserId"], 2);
    assert_eq!(next_frame(&mut laptop).await.event, "AdoptionStatusChanged");

    // A broadcast sent afterwards is the next frame for everyone else.
    pipeline.publisher.publish("Ping", None).await.unwrap();
    assert_eq!(next_frame(&mut other).await.event, "Ping");
    assert_eq!(next_frame(&mut anonymous).await.event, "Ping");

    let stored = pipeline.store.notifications_for_user(2).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, NotificationType::AdoptionStatus);
    assert_eq!(stored[0].message, "Your adoption request has been approved");
    assert!(pipeline.store.notifications_for_user(3).await.is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_adoption_request_notifies_administrators() {
    let pipeline = Pipeline::start(users()).await;
    let mut requester = pipeline.connect(Some("2")).await;

    pipeline
        .publisher
        .publish_event(&DomainEvent::AdoptionRequestCreated {
            request: request(2, AdoptionStatus::Pending),
        })
        .await
        .unwrap();

    assert_eq!(next_frame(&mut requester).await.event, "AdoptionRequestCreated");

    let stored = pipeline.store.notifications().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, 1);
    assert_eq!(stored[0].kind, NotificationType::NewRequest);

    pipeline.stop().await;
}

// ============================================================================
// Dropped messages
// ============================================================================

#[tokio::test]
async fn test_empty_event_dropped_and_loop_continues() {
    let pipeline = Pipeline::start(users()).await;
    let mut client = pipeline.connect(None).await;

    pipeline
        .broker
        .inject(QUEUE, br#"{"event":"","data":{"Pet":{"name":"Ghost"}}}"#.to_vec())
        .await
        .unwrap();
    pipeline.publisher.publish("PetCreated", None).await.unwrap();

    assert_eq!(next_frame(&mut client).await.event, "PetCreated");
    pipeline.wait_received(2).await;

    let stats = pipeline.subscriber.stats();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.dispatched, 1);
    assert!(pipeline
        .store
        .notifications()
        .await
        .iter()
        .all(|n| n.message == "A new pet is available for adoption"));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_malformed_message_followed_by_valid_one() {
    let pipeline = Pipeline::start(users()).await;
    let mut client = pipeline.connect(Some("1")).await;

    pipeline
        .broker
        .inject(QUEUE, b"\x00not json".to_vec())
        .await
        .unwrap();
    pipeline
        .publisher
        .publish_event(&DomainEvent::AdoptionRequestCreated {
            request: request(3, AdoptionStatus::Pending),
        })
        .await
        .unwrap();

    assert_eq!(next_frame(&mut client).await.event, "AdoptionRequestCreated");
    pipeline.wait_received(2).await;
    assert_eq!(pipeline.subscriber.stats().dropped, 1);
    assert_eq!(pipeline.store.notifications_for_user(1).await.len(), 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_disconnected_client_stops_receiving() {
    let pipeline = Pipeline::start(users()).await;
    let gone = pipeline.connect(Some("2")).await;
    let mut stays = pipeline.connect(Some("2")).await;

    assert!(pipeline.registry.on_disconnect(gone.id).await);
    assert!(!pipeline.registry.on_disconnect(gone.id).await);

    pipeline
        .publisher
        .publish_event(&DomainEvent::AdoptionStatusChanged {
            request: request(2, AdoptionStatus::Rejected),
        })
        .await
        .unwrap();

    assert_eq!(next_frame(&mut stays).await.event, "AdoptionStatusChanged");
    assert_eq!(pipeline.registry.user_connection_count("2").await, 1);

    pipeline.stop().await;
}
