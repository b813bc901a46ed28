//! Broker topology.
//!
//! One durable fanout exchange, bound with an empty routing key to one
//! durable queue. Publishers only need the exchange; the notification
//! service declares all three so it can start before any publisher.

use crate::broker::BrokerChannel;
use crate::config::BrokerConfig;
use crate::error::EventResult;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Exchange types supported by the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Copies every message to all bound queues; routing keys are ignored
    Fanout,
}

impl ExchangeKind {
    /// AMQP exchange type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Fanout => "fanout",
        }
    }
}

/// Exchange declaration parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeSpec {
    /// Exchange name
    pub name: String,
    /// Exchange type
    pub kind: ExchangeKind,
    /// Survives broker restarts
    pub durable: bool,
    /// Deleted when the last binding goes away
    pub auto_delete: bool,
}

impl ExchangeSpec {
    /// Durable, non-auto-deleted fanout exchange.
    pub fn fanout(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Fanout,
            durable: true,
            auto_delete: false,
        }
    }
}

/// Queue declaration parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name
    pub name: String,
    /// Survives broker restarts
    pub durable: bool,
    /// Restricted to the declaring connection
    pub exclusive: bool,
    /// Deleted when the last consumer goes away
    pub auto_delete: bool,
}

impl QueueSpec {
    /// Durable, shared, non-auto-deleted queue.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// The exchange/queue pair used by the event pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topology {
    /// Exchange events are published to
    pub exchange: ExchangeSpec,
    /// Queue the notification service consumes
    pub queue: QueueSpec,
    /// Binding key (empty: fanout ignores it)
    pub routing_key: String,
}

impl Topology {
    /// Fanout exchange bound to a durable queue.
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: ExchangeSpec::fanout(exchange),
            queue: QueueSpec::durable(queue),
            routing_key: String::new(),
        }
    }

    /// Topology named by broker configuration.
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.exchange.clone(), config.queue.clone())
    }

    /// Declare the exchange only.
    pub async fn declare_exchange(&self, channel: &dyn BrokerChannel) -> EventResult<()> {
        channel.declare_exchange(&self.exchange).await
    }

    /// Declare the exchange and queue and bind them.
    pub async fn declare(&self, channel: &dyn BrokerChannel) -> EventResult<()> {
        channel.declare_exchange(&self.exchange).await?;
        channel.declare_queue(&self.queue).await?;
        channel
            .bind_queue(&self.queue.name, &self.exchange.name, &self.routing_key)
            .await?;

        info!(
            exchange = %self.exchange.name,
            queue = %self.queue.name,
            "Declared broker topology"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_defaults() {
        let topology = Topology::new("events", "notifications");

        assert_eq!(topology.exchange.kind, ExchangeKind::Fanout);
        assert!(topology.exchange.durable);
        assert!(!topology.exchange.auto_delete);
        assert!(topology.queue.durable);
        assert!(!topology.queue.exclusive);
        assert!(!topology.queue.auto_delete);
        assert_eq!(topology.routing_key, "");
    }

    #[test]
    fn test_from_config() {
        let topology = Topology::from_config(&BrokerConfig::default());
        assert_eq!(topology.exchange.name, "petfoundation.events");
        assert_eq!(topology.queue.name, "petfoundation.notifications");
    }
}
