//! pet-notifications: notification service
//!
//! Consumes domain events from the broker, stores per-user notification
//! records and pushes live frames to WebSocket clients.
//!
//! ## Architecture
//! ```text
//! [RabbitMQ queue] --(AMQP)--> [EventSubscriber] --> [Dispatcher] --> [WebSocket hub] --> clients
//! ```
//!
//! ## Configuration
//! - NOTIFICATIONS_BIND_ADDR: Listen address (default: 0.0.0.0:5003)
//! - NOTIFICATIONS_HUB_PATH: WebSocket hub path (default: /hubs/notifications)
//! - RABBITMQ_*: Broker connection, exchange and queue
//! - JWT_SECRET, JWT_ISSUER, JWT_AUDIENCE: Bearer token validation
//! - RUST_LOG: Log filter (default: info)
//!
//! The process exits with an error when the subscriber cannot set up its
//! topology or loses the broker, and is expected to be restarted by its
//! supervisor.
//!
//! ## Persistence
//! This binary wires an in-memory [`MemoryNotificationStore`] with an empty
//! user directory, so `PetCreated` and `AdoptionRequestCreated` create no
//! records and only the real-time push happens. Durable notifications need a
//! `NotificationStore` adapter over the platform database in its place.

use std::sync::Arc;

use pet_auth::{BearerAuthenticator, JwtService};
use pet_events::{AmqpConnector, Topology};
use pet_notifications::{
    router, serve, ConnectionRegistry, Dispatcher, EventSubscriber, HubState,
    MemoryNotificationStore, NotificationsConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = NotificationsConfig::from_env()?;
    if let Err(e) = config.validate_for_production() {
        warn!(error = %e, "Running with development configuration");
    }

    let shutdown = CancellationToken::new();
    let registry = Arc::new(ConnectionRegistry::new());
    let store = Arc::new(MemoryNotificationStore::new());
    warn!("Using in-memory notification store with an empty user directory; records are not persisted");
    let dispatcher = Arc::new(Dispatcher::new(store, registry.clone()));

    let subscriber = Arc::new(EventSubscriber::new(
        Arc::new(AmqpConnector::from_config(&config.broker)),
        Topology::from_config(&config.broker),
        config.consumer_tag.clone(),
        dispatcher,
    ));

    let authenticator = Arc::new(BearerAuthenticator::new(JwtService::new(
        config.jwt.clone(),
    )?));
    let app = router(
        &config.hub_path,
        HubState::new(
            registry,
            authenticator,
            subscriber.watch_state(),
            shutdown.clone(),
        ),
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    info!(
        bind_addr = %config.bind_addr,
        hub_path = %config.hub_path,
        broker = ?config.broker,
        "pet-notifications started"
    );

    let mut consumer = tokio::spawn({
        let subscriber = subscriber.clone();
        let shutdown = shutdown.clone();
        async move { subscriber.run(shutdown).await }
    });
    let server = tokio::spawn(serve(listener, app, shutdown.clone()));

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            None
        }
        result = &mut consumer => Some(result),
    };
    shutdown.cancel();

    let consumed = match finished {
        Some(result) => result,
        None => consumer.await,
    };
    server.await??;
    consumed??;

    info!(stats = ?subscriber.stats(), "pet-notifications stopped");
    Ok(())
}
