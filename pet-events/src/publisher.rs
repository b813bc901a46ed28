//! Event publisher.
//!
//! Wraps a payload in an [`Envelope`] and sends it to the fanout exchange.
//! The broker connection is opened lazily on the first publish and shared by
//! every later call.

use crate::broker::{BrokerChannel, BrokerConnection, BrokerConnector, MessageProperties};
use crate::envelope::Envelope;
use crate::error::{EventError, EventResult};
use crate::payload::DomainEvent;
use crate::topology::Topology;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Publishes domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    ///
    /// # Arguments
    ///
    /// * `event_name` - Name of the domain occurrence (e.g., "PetCreated")
    /// * `payload` - Event data, copied into the envelope
    async fn publish(&self, event_name: &str, payload: Option<Value>) -> EventResult<()>;

    /// Publish a typed domain event with its conventional payload shape.
    async fn publish_event(&self, event: &DomainEvent) -> EventResult<()> {
        let payload = event
            .to_payload()
            .map_err(|e| EventError::Serialization(e.to_string()))?;
        self.publish(event.kind().as_str(), Some(payload)).await
    }
}

struct BrokerSession {
    connection: Box<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
}

/// Publisher backed by a message broker.
pub struct BrokerPublisher {
    connector: Arc<dyn BrokerConnector>,
    topology: Topology,
    session: OnceCell<BrokerSession>,
    exchange_declared: OnceCell<()>,
    properties: MessageProperties,
}

impl std::fmt::Debug for BrokerPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerPublisher")
            .field("exchange", &self.topology.exchange.name)
            .field("connected", &self.session.initialized())
            .field("exchange_declared", &self.exchange_declared.initialized())
            .finish()
    }
}

impl BrokerPublisher {
    /// Create a publisher. No connection is made until the first publish.
    pub fn new(connector: Arc<dyn BrokerConnector>, topology: Topology) -> Self {
        Self {
            connector,
            topology,
            session: OnceCell::new(),
            exchange_declared: OnceCell::new(),
            properties: MessageProperties::persistent_json(),
        }
    }

    /// Exchange this publisher sends to.
    pub fn exchange(&self) -> &str {
        &self.topology.exchange.name
    }

    /// Whether the broker connection has been established.
    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    async fn channel(&self) -> EventResult<&Arc<dyn BrokerChannel>> {
        let session = self
            .session
            .get_or_try_init(|| async {
                let connection = self.connector.connect().await?;
                let channel = connection.open_channel().await?;
                info!(exchange = %self.topology.exchange.name, "Publisher connected to broker");
                Ok::<_, EventError>(BrokerSession {
                    connection,
                    channel,
                })
            })
            .await?;

        self.exchange_declared
            .get_or_try_init(|| async {
                self.topology.declare_exchange(session.channel.as_ref()).await
            })
            .await?;

        Ok(&session.channel)
    }

    /// Close the channel and connection.
    ///
    /// Publishing after `close` fails with a transport error.
    pub async fn close(&self) -> EventResult<()> {
        if let Some(session) = self.session.get() {
            if let Err(e) = session.channel.close().await {
                warn!(error = %e, "Failed to close publisher channel");
            }
            session.connection.close().await?;
            info!(exchange = %self.topology.exchange.name, "Publisher closed");
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for BrokerPublisher {
    async fn publish(&self, event_name: &str, payload: Option<Value>) -> EventResult<()> {
        if event_name.trim().is_empty() {
            return Err(EventError::Malformed("Event name is empty".to_string()));
        }

        let envelope = Envelope::new(event_name, payload);
        let body = envelope.to_bytes()?;
        let channel = self.channel().await?;

        channel
            .publish(
                &self.topology.exchange.name,
                &self.topology.routing_key,
                body,
                self.properties,
            )
            .await?;

        debug!(
            event = %event_name,
            exchange = %self.topology.exchange.name,
            "Published event"
        );

        Ok(())
    }
}
