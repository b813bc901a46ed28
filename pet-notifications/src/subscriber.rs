//! Broker subscriber.
//!
//! One long-running task: connect, declare the topology, consume the
//! notification queue and hand every delivery to the [`Dispatcher`] in
//! broker order. Messages are acknowledged on receipt.
//!
//! ```text
//! Disconnected ──run──▶ Connecting ──setup ok──▶ Consuming
//!       ▲                    │                       │
//!       └────setup error─────┘                       │
//!       └──────────stream closed / shutdown──────────┘
//! ```
//!
//! There is no reconnect loop. Setup failures and a closed delivery stream
//! end [`EventSubscriber::run`] with an error and the process supervisor is
//! expected to restart the service.

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{SubscriberError, SubscriberResult};
use futures::StreamExt;
use pet_events::{
    BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, EventResult, Topology,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Subscriber lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberState {
    /// Not connected to the broker
    Disconnected,
    /// Connecting and declaring topology
    Connecting,
    /// Consuming the notification queue
    Consuming,
}

/// Subscriber counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberStats {
    /// Messages received from the broker
    pub received: u64,
    /// Messages dispatched
    pub dispatched: u64,
    /// Messages dropped as malformed or unnamed
    pub dropped: u64,
}

struct ConsumerSession {
    connection: Box<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
    deliveries: DeliveryStream,
}

/// Consumes domain events from the broker.
pub struct EventSubscriber {
    connector: Arc<dyn BrokerConnector>,
    topology: Topology,
    consumer_tag: String,
    dispatcher: Arc<Dispatcher>,
    state: watch::Sender<SubscriberState>,
    received: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("queue", &self.topology.queue.name)
            .field("state", &self.state())
            .finish()
    }
}

impl EventSubscriber {
    /// Create a subscriber.
    ///
    /// # Arguments
    ///
    /// * `connector` - Broker connector
    /// * `topology` - Exchange and queue to declare and consume
    /// * `consumer_tag` - Tag identifying this consumer to the broker
    /// * `dispatcher` - Handles each delivery
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        topology: Topology,
        consumer_tag: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (state, _) = watch::channel(SubscriberState::Disconnected);
        Self {
            connector,
            topology,
            consumer_tag: consumer_tag.into(),
            dispatcher,
            state,
            received: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> SubscriberState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn watch_state(&self) -> watch::Receiver<SubscriberState> {
        self.state.subscribe()
    }

    /// Message counters.
    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: SubscriberState) {
        self.state.send_replace(state);
    }

    /// Consume until `shutdown` is cancelled or the broker fails.
    ///
    /// A message already being dispatched is finished before cancellation is
    /// observed. The channel and connection are closed on every exit path.
    pub async fn run(&self, shutdown: CancellationToken) -> SubscriberResult<()> {
        self.set_state(SubscriberState::Connecting);

        let session = tokio::select! {
            _ = shutdown.cancelled() => {
                self.set_state(SubscriberState::Disconnected);
                return Ok(());
            }
            session = self.open() => session,
        };
        let mut session = match session {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Subscriber setup failed");
                self.set_state(SubscriberState::Disconnected);
                return Err(SubscriberError::Setup(e));
            }
        };

        self.set_state(SubscriberState::Consuming);
        info!(
            exchange = %self.topology.exchange.name,
            queue = %self.topology.queue.name,
            "Subscriber listening"
        );

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Subscriber shutting down");
                    break Ok(());
                }
                next = session.deliveries.next() => match next {
                    Some(Ok(body)) => self.handle(&body).await,
                    Some(Err(e)) => {
                        error!(error = %e, "Delivery stream failed");
                        break Err(SubscriberError::StreamClosed(e.to_string()));
                    }
                    None => {
                        error!("Delivery stream ended");
                        break Err(SubscriberError::StreamClosed(
                            "consumer cancelled by broker".to_string(),
                        ));
                    }
                },
            }
        };

        Self::close(session).await;
        self.set_state(SubscriberState::Disconnected);
        result
    }

    async fn handle(&self, body: &[u8]) {
        self.received.fetch_add(1, Ordering::Relaxed);
        match self.dispatcher.handle_bytes(body).await {
            DispatchOutcome::Dropped(reason) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(reason = ?reason, "Message dropped");
            }
            DispatchOutcome::Dispatched { .. } => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn open(&self) -> EventResult<ConsumerSession> {
        let connection = self.connector.connect().await?;

        let setup = async {
            let channel = connection.open_channel().await?;
            self.topology.declare(channel.as_ref()).await?;
            let deliveries = channel
                .consume(&self.topology.queue.name, &self.consumer_tag)
                .await?;
            EventResult::Ok((channel, deliveries))
        }
        .await;

        match setup {
            Ok((channel, deliveries)) => Ok(ConsumerSession {
                connection,
                channel,
                deliveries,
            }),
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(error = %close_err, "Failed to close connection after setup error");
                }
                Err(e)
            }
        }
    }

    async fn close(session: ConsumerSession) {
        drop(session.deliveries);
        if let Err(e) = session.channel.close().await {
            warn!(error = %e, "Failed to close subscriber channel");
        }
        if let Err(e) = session.connection.close().await {
            warn!(error = %e, "Failed to close subscriber connection");
        }
    }
}
