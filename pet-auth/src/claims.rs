//! JWT claims for platform access tokens
//!
//! The API issues HMAC-signed access tokens carrying the identity provider's
//! user id in `sub`, the user's email and display name, and role claims.
//! Tokens may also carry a `domain_user_id` claim with the application-level
//! user id used to address notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Custom claim carrying the domain user id.
pub const DOMAIN_USER_ID_CLAIM: &str = "domain_user_id";

/// Short name-identifier claim.
pub const NAME_ID_CLAIM: &str = "nameid";

/// Long-form name-identifier claim written by some token issuers.
pub const NAME_ID_CLAIM_URI: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";

/// Short role claim.
pub const ROLE_CLAIM: &str = "role";

/// Long-form role claim written by some token issuers.
pub const ROLE_CLAIM_URI: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// Administrator role name.
pub const ADMIN_ROLE: &str = "Admin";

/// Claims of a platform access token.
///
/// Only `sub` and `exp` are required. Everything else the issuer writes is
/// kept in `custom` and read through the accessor methods.
///
/// # Example
///
/// ```rust
/// use pet_auth::AccessClaims;
///
/// let claims = AccessClaims::new("identity-user-1", chrono::Duration::hours(6))
///     .with_domain_user_id(42)
///     .with_role("Admin");
///
/// assert_eq!(claims.domain_user_id().as_deref(), Some("42"));
/// assert!(claims.is_admin());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (identity provider user ID)
    pub sub: String,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,

    /// JWT ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// User email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// User display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Remaining claims (identity, roles and anything issuer-specific)
    #[serde(default, flatten)]
    pub custom: HashMap<String, Value>,
}

impl AccessClaims {
    /// Create new claims for a subject.
    ///
    /// # Arguments
    ///
    /// * `subject` - Identity provider user ID
    /// * `duration` - Token validity duration
    pub fn new(subject: impl Into<String>, duration: chrono::Duration) -> Self {
        let now = Utc::now();
        let exp = now + duration;

        Self {
            sub: subject.into(),
            iss: None,
            aud: None,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Some(Uuid::now_v7().to_string()),
            email: None,
            name: None,
            custom: HashMap::new(),
        }
    }

    /// Identity used to address real-time deliveries.
    ///
    /// The `domain_user_id` claim wins, then the name identifier, then `sub`.
    /// Blank values are skipped.
    pub fn domain_user_id(&self) -> Option<String> {
        [DOMAIN_USER_ID_CLAIM, NAME_ID_CLAIM, NAME_ID_CLAIM_URI]
            .iter()
            .find_map(|claim| self.custom.get(*claim).and_then(claim_text))
            .or_else(|| non_blank(&self.sub))
    }

    /// Roles granted to the user.
    ///
    /// Accepts a single string or an array under either role claim name.
    pub fn roles(&self) -> Vec<String> {
        let mut roles = Vec::new();
        for claim in [ROLE_CLAIM, ROLE_CLAIM_URI] {
            match self.custom.get(claim) {
                Some(Value::String(role)) => roles.push(role.clone()),
                Some(Value::Array(values)) => roles.extend(
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
        roles
    }

    /// Check if the user has a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }

    /// Check if the user is an administrator.
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Get expiration as DateTime.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }

    /// Set the domain user id claim.
    pub fn with_domain_user_id(mut self, user_id: i64) -> Self {
        self.custom
            .insert(DOMAIN_USER_ID_CLAIM.to_string(), Value::from(user_id));
        self
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let role = Value::String(role.into());
        match self.custom.get_mut(ROLE_CLAIM) {
            Some(Value::Array(values)) => values.push(role),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, role]);
            }
            None => {
                self.custom.insert(ROLE_CLAIM.to_string(), role);
            }
        }
        self
    }

    /// Set the issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }

    /// Set the audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.aud = Some(audience.into());
        self
    }

    /// Set the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a custom claim.
    pub fn with_custom(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

fn claim_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims() -> AccessClaims {
        AccessClaims::new("identity-user-1", chrono::Duration::hours(1))
    }

    #[test]
    fn test_domain_user_id_claim_wins() {
        let claims = claims()
            .with_custom(NAME_ID_CLAIM, json!("name-id"))
            .with_domain_user_id(42);
        assert_eq!(claims.domain_user_id().as_deref(), Some("42"));
    }

    #[test]
    fn test_name_identifier_before_subject() {
        let claims = claims().with_custom(NAME_ID_CLAIM, json!("name-id"));
        assert_eq!(claims.domain_user_id().as_deref(), Some("name-id"));

        let claims = AccessClaims::new("sub", chrono::Duration::hours(1))
            .with_custom(NAME_ID_CLAIM_URI, json!("long-form"));
        assert_eq!(claims.domain_user_id().as_deref(), Some("long-form"));
    }

    #[test]
    fn test_subject_fallback() {
        assert_eq!(claims().domain_user_id().as_deref(), Some("identity-user-1"));

        let blank = claims().with_custom(DOMAIN_USER_ID_CLAIM, json!("  "));
        assert_eq!(blank.domain_user_id().as_deref(), Some("identity-user-1"));
    }

    #[test]
    fn test_string_domain_user_id() {
        let claims = claims().with_custom(DOMAIN_USER_ID_CLAIM, json!("7"));
        assert_eq!(claims.domain_user_id().as_deref(), Some("7"));
    }

    #[test]
    fn test_roles() {
        let claims = claims().with_role("User").with_role("Admin");
        assert_eq!(claims.roles(), vec!["User".to_string(), "Admin".to_string()]);
        assert!(claims.is_admin());

        let uri = AccessClaims::new("sub", chrono::Duration::hours(1))
            .with_custom(ROLE_CLAIM_URI, json!("Admin"));
        assert!(uri.is_admin());
        assert!(!self::claims().is_admin());
    }

    #[test]
    fn test_deserialize_issuer_token() {
        let raw = json!({
            "sub": "abc",
            "email": "ana@example.com",
            "name": "Ana",
            "exp": 4_102_444_800i64,
            "iss": "PetFoundation",
            "aud": "PetFoundationClients",
            "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": ["User"],
            "domain_user_id": 12
        });
        let claims: AccessClaims = serde_json::from_value(raw).unwrap();

        assert_eq!(claims.name.as_deref(), Some("Ana"));
        assert_eq!(claims.domain_user_id().as_deref(), Some("12"));
        assert!(claims.has_role("User"));
        assert!(!claims.is_expired());
    }
}
