//! Notification service configuration.
//!
//! Bind address, WebSocket hub path, broker settings and JWT validation
//! settings. Configuration is loaded from environment variables with defaults
//! for local development.

use crate::error::ConfigError;
use pet_auth::JwtConfig;
use pet_events::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5003";

/// Default WebSocket hub path.
pub const DEFAULT_HUB_PATH: &str = "/hubs/notifications";

/// Default broker consumer tag.
pub const DEFAULT_CONSUMER_TAG: &str = "pet-notifications";

/// Notification service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Address the HTTP/WebSocket server listens on.
    pub bind_addr: SocketAddr,

    /// Path of the WebSocket hub.
    pub hub_path: String,

    /// Consumer tag used when consuming the notification queue.
    pub consumer_tag: String,

    /// Message broker settings.
    pub broker: BrokerConfig,

    /// Bearer token validation settings.
    pub jwt: JwtConfig,
}

impl Default for NotificationsConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5003)),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            consumer_tag: DEFAULT_CONSUMER_TAG.to_string(),
            broker: BrokerConfig::default(),
            jwt: JwtConfig::default(),
        }
    }
}

impl NotificationsConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NOTIFICATIONS_BIND_ADDR`: Listen address (default: 0.0.0.0:5003)
    /// - `NOTIFICATIONS_HUB_PATH`: WebSocket hub path (default: /hubs/notifications)
    /// - `NOTIFICATIONS_CONSUMER_TAG`: Broker consumer tag (default: pet-notifications)
    /// - `RABBITMQ_*`: Broker settings, see [`BrokerConfig::from_env`]
    /// - `JWT_SECRET`, `JWT_ISSUER`, `JWT_AUDIENCE`: see [`JwtConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let bind_addr = match std::env::var("NOTIFICATIONS_BIND_ADDR") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "NOTIFICATIONS_BIND_ADDR".to_string(),
                message: format!("{}", e),
            })?,
            Err(_) => default.bind_addr,
        };

        let hub_path = std::env::var("NOTIFICATIONS_HUB_PATH").unwrap_or(default.hub_path);
        if !hub_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFICATIONS_HUB_PATH".to_string(),
                message: "must start with '/'".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            hub_path,
            consumer_tag: std::env::var("NOTIFICATIONS_CONSUMER_TAG")
                .unwrap_or(default.consumer_tag),
            broker: BrokerConfig::from_env(),
            jwt: JwtConfig::from_env(),
        })
    }

    /// Validate that all required configuration is present for production.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }
        self.jwt
            .validate_for_production()
            .map_err(|e| ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                message: e.to_string(),
            })?;
        if self.broker.password == "guest" {
            return Err(ConfigError::InvalidValue {
                key: "RABBITMQ_PASSWORD".to_string(),
                message: "default broker credentials are not allowed in production".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NotificationsConfig::default();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.hub_path, "/hubs/notifications");
        assert_eq!(config.broker.queue, "petfoundation.notifications");
    }

    #[test]
    fn test_validate_for_production() {
        let config = NotificationsConfig::default();
        assert!(matches!(
            config.validate_for_production(),
            Err(ConfigError::MissingEnvVar(_))
        ));

        let mut config = NotificationsConfig::default();
        config.jwt.secret = "a-production-secret-that-is-long-enough".to_string();
        assert!(matches!(
            config.validate_for_production(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.broker.password = "s3cret".to_string();
        assert!(config.validate_for_production().is_ok());
    }
}
