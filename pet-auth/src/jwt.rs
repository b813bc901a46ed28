//! JWT token validation
//!
//! This module validates the HMAC-signed access tokens issued by the platform
//! API using the jsonwebtoken crate. Token generation is provided for tests
//! and tooling; production tokens are issued by the API.

use crate::claims::AccessClaims;
use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};

/// Minimum secret length accepted in production.
pub const MIN_SECRET_LEN: usize = 32;

/// JWT configuration for token validation.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Shared HMAC secret
    pub secret: String,

    /// Algorithm to use
    pub algorithm: JwtAlgorithm,

    /// Expected issuer (not checked when `None`)
    pub issuer: Option<String>,

    /// Expected audience (not checked when `None`)
    pub audience: Option<String>,

    /// Clock skew tolerance in seconds
    pub leeway_secs: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: JwtAlgorithm::HS256,
            issuer: None,
            audience: None,
            leeway_secs: 60,
        }
    }
}

impl JwtConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `JWT_SECRET`: Shared HMAC secret
    /// - `JWT_ISSUER`: Expected issuer (optional)
    /// - `JWT_AUDIENCE`: Expected audience (optional)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            secret: std::env::var("JWT_SECRET").unwrap_or(default.secret),
            issuer: std::env::var("JWT_ISSUER")
                .ok()
                .filter(|s| !s.is_empty())
                .or(default.issuer),
            audience: std::env::var("JWT_AUDIENCE")
                .ok()
                .filter(|s| !s.is_empty())
                .or(default.audience),
            ..default
        }
    }

    /// Validate configuration for production use.
    pub fn validate_for_production(&self) -> AuthResult<()> {
        if self.secret.is_empty() {
            return Err(AuthError::ConfigError("JWT_SECRET is required".to_string()));
        }
        if self.secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::ConfigError(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        Ok(())
    }
}

/// Supported JWT algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// JWT service for token operations.
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("config", &self.config)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - JWT configuration
    ///
    /// # Returns
    ///
    /// JWT service or configuration error
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::ConfigError(
                "Secret required for HMAC".to_string(),
            ));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Create with a simple secret (HS256, no issuer or audience checks).
    ///
    /// # Arguments
    ///
    /// * `secret` - The secret key for HMAC
    pub fn with_secret(secret: impl Into<String>) -> AuthResult<Self> {
        Self::new(JwtConfig {
            secret: secret.into(),
            ..Default::default()
        })
    }

    /// Encode claims into a signed token.
    ///
    /// # Arguments
    ///
    /// * `claims` - Access claims to encode
    ///
    /// # Returns
    ///
    /// Encoded JWT token string
    pub fn encode_claims(&self, claims: &AccessClaims) -> AuthResult<String> {
        let header = Header::new(self.config.algorithm.into());
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Validate and decode a token.
    ///
    /// Checks the signature and expiry, and the issuer and audience when
    /// they are configured.
    ///
    /// # Arguments
    ///
    /// * `token` - The JWT token string
    ///
    /// # Returns
    ///
    /// Decoded claims if valid
    pub fn validate_token(&self, token: &str) -> AuthResult<AccessClaims> {
        let mut validation = Validation::new(self.config.algorithm.into());
        validation.leeway = self.config.leeway_secs;

        match &self.config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data: TokenData<AccessClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidToken => AuthError::InvalidToken("Malformed token".to_string()),
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("Invalid signature".to_string())
                }
                ErrorKind::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
                ErrorKind::InvalidAudience => {
                    AuthError::InvalidToken("Invalid audience".to_string())
                }
                ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    /// Get the configuration.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_secret() -> String {
        "test-secret-key-for-jwt-signing-minimum-32-chars".to_string()
    }

    #[test]
    fn test_jwt_service_creation() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        assert_eq!(service.config().algorithm, JwtAlgorithm::HS256);

        let err = JwtService::with_secret("").unwrap_err();
        assert!(matches!(err, AuthError::ConfigError(_)));
    }

    #[test]
    fn test_token_round_trip() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let claims = AccessClaims::new("identity-1", Duration::hours(1))
            .with_domain_user_id(9)
            .with_role("Admin");

        let token = service.encode_claims(&claims).unwrap();
        let decoded = service.validate_token(&token).unwrap();

        assert_eq!(decoded.sub, "identity-1");
        assert_eq!(decoded.domain_user_id().as_deref(), Some("9"));
        assert!(decoded.is_admin());
    }

    #[test]
    fn test_invalid_token() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let result = service.validate_token("invalid-token");

        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let issuer = JwtService::with_secret(test_secret()).unwrap();
        let other = JwtService::with_secret("another-secret-key-that-is-long-enough!!").unwrap();
        let token = issuer
            .encode_claims(&AccessClaims::new("identity-1", Duration::hours(1)))
            .unwrap();

        assert!(matches!(
            other.validate_token(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let claims = AccessClaims::new("identity-1", Duration::hours(-2));
        let token = service.encode_claims(&claims).unwrap();

        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_issuer_and_audience() {
        let service = JwtService::new(JwtConfig {
            secret: test_secret(),
            issuer: Some("PetFoundation".to_string()),
            audience: Some("PetFoundationClients".to_string()),
            ..Default::default()
        })
        .unwrap();

        let good = AccessClaims::new("identity-1", Duration::hours(1))
            .with_issuer("PetFoundation")
            .with_audience("PetFoundationClients");
        assert!(service
            .validate_token(&service.encode_claims(&good).unwrap())
            .is_ok());

        let wrong_issuer = AccessClaims::new("identity-1", Duration::hours(1))
            .with_issuer("Elsewhere")
            .with_audience("PetFoundationClients");
        assert!(matches!(
            service.validate_token(&service.encode_claims(&wrong_issuer).unwrap()),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_validate_for_production() {
        assert!(JwtConfig::default().validate_for_production().is_err());

        let short = JwtConfig {
            secret: "short".to_string(),
            ..Default::default()
        };
        assert!(short.validate_for_production().is_err());

        let good = JwtConfig {
            secret: test_secret(),
            ..Default::default()
        };
        assert!(good.validate_for_production().is_ok());
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let config = JwtConfig {
            secret: test_secret(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("minimum-32-chars"));
    }
}
