//! AMQP (RabbitMQ) broker backend.
//!
//! Thin adapter from the broker traits onto `lapin`. Connection and channel
//! lifecycle is owned by the caller (the publisher or the subscriber); this
//! module does not reconnect on its own.

use crate::broker::{
    BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, MessageProperties,
};
use crate::config::BrokerConfig;
use crate::error::{EventError, EventResult};
use crate::topology::{ExchangeKind, ExchangeSpec, QueueSpec};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, info};

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;
/// Transient delivery mode.
const DELIVERY_MODE_TRANSIENT: u8 = 1;

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

/// Connector for a RabbitMQ broker.
#[derive(Clone)]
pub struct AmqpConnector {
    uri: AMQPUri,
}

impl std::fmt::Debug for AmqpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConnector")
            .field("host", &self.uri.authority.host)
            .field("port", &self.uri.authority.port)
            .field("vhost", &self.uri.vhost)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

impl AmqpConnector {
    /// Create a connector for a parsed AMQP URI.
    pub fn new(uri: AMQPUri) -> Self {
        Self { uri }
    }

    /// Create a connector from broker configuration.
    ///
    /// Credentials and virtual host are passed through as-is; `lapin` handles
    /// their encoding on the wire.
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: config.host.clone(),
                port: config.port,
            },
            vhost: config.vhost.clone(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> EventResult<Box<dyn BrokerConnection>> {
        let connection = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
            .await
            .map_err(|e| EventError::Transport(format!("Failed to connect: {}", e)))?;

        info!("Connected to AMQP broker");

        Ok(Box::new(AmqpConnection { inner: connection }))
    }
}

struct AmqpConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> EventResult<Arc<dyn BrokerChannel>> {
        let channel = self
            .inner
            .create_channel()
            .await
            .map_err(|e| EventError::Transport(format!("Failed to create channel: {}", e)))?;

        Ok(Arc::new(AmqpChannel { inner: channel }))
    }

    async fn close(&self) -> EventResult<()> {
        self.inner
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|e| EventError::Transport(format!("Failed to close connection: {}", e)))
    }
}

struct AmqpChannel {
    inner: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> EventResult<()> {
        self.inner
            .exchange_declare(
                &spec.name,
                spec.kind.into(),
                ExchangeDeclareOptions {
                    durable: spec.durable,
                    auto_delete: spec.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                EventError::Topology(format!("Failed to declare exchange '{}': {}", spec.name, e))
            })
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> EventResult<()> {
        self.inner
            .queue_declare(
                &spec.name,
                QueueDeclareOptions {
                    durable: spec.durable,
                    exclusive: spec.exclusive,
                    auto_delete: spec.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map(|_| ())
            .map_err(|e| {
                EventError::Topology(format!("Failed to declare queue '{}': {}", spec.name, e))
            })
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EventResult<()> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| EventError::Topology(format!("Failed to bind queue '{}': {}", queue, e)))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> EventResult<()> {
        let delivery_mode = if properties.persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        };
        let amqp_properties = BasicProperties::default()
            .with_content_type(properties.content_type.into())
            .with_delivery_mode(delivery_mode);

        let confirm = self
            .inner
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                amqp_properties,
            )
            .await
            .map_err(|e| EventError::Transport(format!("Failed to publish: {}", e)))?;

        confirm
            .await
            .map_err(|e| EventError::Transport(format!("Publish confirmation failed: {}", e)))?;

        debug!(exchange = %exchange, bytes = body.len(), "Published message");

        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> EventResult<DeliveryStream> {
        let consumer = self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| EventError::Transport(format!("Failed to start consumer: {}", e)))?;

        let stream = consumer.map(|delivery| {
            delivery
                .map(|d| d.data)
                .map_err(|e| EventError::Transport(format!("Consumer delivery error: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> EventResult<()> {
        self.inner
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|e| EventError::Transport(format!("Failed to close channel: {}", e)))
    }
}
