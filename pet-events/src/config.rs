//! Broker configuration.
//!
//! Connection and topology settings for the message broker. Configuration is
//! loaded from environment variables with defaults for local development.

use serde::{Deserialize, Serialize};

/// Default exchange name.
pub const DEFAULT_EXCHANGE: &str = "petfoundation.events";
/// Default notification queue name.
pub const DEFAULT_QUEUE: &str = "petfoundation.notifications";

/// Message broker configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker host name.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// User name.
    pub username: String,

    /// Password.
    pub password: String,

    /// Virtual host.
    pub vhost: String,

    /// Fanout exchange events are published to.
    pub exchange: String,

    /// Durable queue the notification service consumes from.
    pub queue: String,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("vhost", &self.vhost)
            .field("exchange", &self.exchange)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Default for BrokerConfig {
    /// Returns a configuration for a local RabbitMQ with default credentials.
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RABBITMQ_HOST`: Broker host (default: localhost)
    /// - `RABBITMQ_PORT`: Broker port (default: 5672)
    /// - `RABBITMQ_USERNAME`: User name (default: guest)
    /// - `RABBITMQ_PASSWORD`: Password (default: guest)
    /// - `RABBITMQ_VHOST`: Virtual host (default: /)
    /// - `RABBITMQ_EXCHANGE`: Exchange name (default: petfoundation.events)
    /// - `RABBITMQ_QUEUE`: Queue name (default: petfoundation.notifications)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: std::env::var("RABBITMQ_HOST").unwrap_or(default.host),
            port: std::env::var("RABBITMQ_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.port),
            username: std::env::var("RABBITMQ_USERNAME").unwrap_or(default.username),
            password: std::env::var("RABBITMQ_PASSWORD").unwrap_or(default.password),
            vhost: std::env::var("RABBITMQ_VHOST").unwrap_or(default.vhost),
            exchange: std::env::var("RABBITMQ_EXCHANGE").unwrap_or(default.exchange),
            queue: std::env::var("RABBITMQ_QUEUE").unwrap_or(default.queue),
        }
    }
}
