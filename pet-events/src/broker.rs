//! Broker transport abstraction.
//!
//! The publisher and the notification subscriber talk to the message broker
//! through these traits, so the AMQP backend can be swapped for the
//! in-memory broker in tests and single-process deployments.

use crate::error::EventResult;
use crate::topology::{ExchangeSpec, QueueSpec};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Stream of message bodies delivered to a consumer.
///
/// Items are acknowledged on receipt. An `Err` item means the channel failed
/// and the stream will not produce further messages.
pub type DeliveryStream = BoxStream<'static, EventResult<Vec<u8>>>;

/// Properties attached to a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageProperties {
    /// Persistent delivery mode (survives a broker restart on a durable queue)
    pub persistent: bool,

    /// Content type of the body
    pub content_type: &'static str,
}

impl MessageProperties {
    /// Persistent JSON message.
    pub fn persistent_json() -> Self {
        Self {
            persistent: true,
            content_type: "application/json",
        }
    }
}

impl Default for MessageProperties {
    fn default() -> Self {
        Self::persistent_json()
    }
}

/// Factory for broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a new connection to the broker.
    async fn connect(&self) -> EventResult<Box<dyn BrokerConnection>>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a channel on this connection.
    async fn open_channel(&self) -> EventResult<Arc<dyn BrokerChannel>>;

    /// Close the connection and every channel opened on it.
    async fn close(&self) -> EventResult<()>;
}

/// A channel on a broker connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange. Identical redeclares are no-ops; conflicting ones fail.
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> EventResult<()>;

    /// Declare a queue. Identical redeclares are no-ops; conflicting ones fail.
    async fn declare_queue(&self, spec: &QueueSpec) -> EventResult<()>;

    /// Bind a queue to an exchange.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EventResult<()>;

    /// Publish a message body to an exchange.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> EventResult<()>;

    /// Start consuming a queue with automatic acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> EventResult<DeliveryStream>;

    /// Close the channel.
    async fn close(&self) -> EventResult<()>;
}
