//! Bearer credential extraction
//!
//! Browser WebSocket clients cannot set an `Authorization` header, so the
//! real-time endpoint also accepts the token in an `access_token` query
//! parameter. The header wins when both are present.

use crate::claims::AccessClaims;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtService;

/// Query parameter carrying the bearer token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

const BEARER_PREFIX: &str = "bearer ";

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched ignoring case. A header with another scheme or an
/// empty token is rejected.
pub fn bearer_from_header(header: &str) -> AuthResult<&str> {
    let header = header.trim();
    let scheme = header
        .get(..BEARER_PREFIX.len())
        .ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return Err(AuthError::MalformedHeader);
    }

    let token = header[BEARER_PREFIX.len()..].trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Pick the bearer token presented by a client.
///
/// # Arguments
///
/// * `authorization` - Value of the `Authorization` header, if any
/// * `query_token` - Value of the `access_token` query parameter, if any
///
/// # Returns
///
/// `Ok(None)` when the client presented no credential at all.
pub fn select_bearer_token(
    authorization: Option<&str>,
    query_token: Option<&str>,
) -> AuthResult<Option<String>> {
    if let Some(header) = authorization {
        return bearer_from_header(header).map(|t| Some(t.to_string()));
    }

    Ok(query_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string))
}

/// Validates the credential presented by a connecting client.
#[derive(Debug)]
pub struct BearerAuthenticator {
    jwt: JwtService,
}

impl BearerAuthenticator {
    /// Create an authenticator backed by a JWT service.
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }

    /// Authenticate a connecting client.
    ///
    /// Returns `Ok(None)` for anonymous clients and an error for a credential
    /// that is present but invalid or expired.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        query_token: Option<&str>,
    ) -> AuthResult<Option<AccessClaims>> {
        match select_bearer_token(authorization, query_token)? {
            Some(token) => self.jwt.validate_token(&token).map(Some),
            None => Ok(None),
        }
    }

    /// The underlying JWT service.
    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "test-secret-key-for-jwt-signing-minimum-32-chars";

    #[test]
    fn test_bearer_from_header() {
        assert_eq!(bearer_from_header("Bearer abc.def").unwrap(), "abc.def");
        assert_eq!(bearer_from_header("bearer   abc ").unwrap(), "abc");
        assert!(bearer_from_header("Basic dXNlcg==").is_err());
        assert!(bearer_from_header("Bearer ").is_err());
        assert!(bearer_from_header("Bearer").is_err());
    }

    #[test]
    fn test_header_wins_over_query() {
        let token = select_bearer_token(Some("Bearer header"), Some("query")).unwrap();
        assert_eq!(token.as_deref(), Some("header"));

        let token = select_bearer_token(None, Some("query")).unwrap();
        assert_eq!(token.as_deref(), Some("query"));

        assert_eq!(select_bearer_token(None, Some("  ")).unwrap(), None);
        assert_eq!(select_bearer_token(None, None).unwrap(), None);
    }

    #[test]
    fn test_authenticate() {
        let jwt = JwtService::with_secret(SECRET).unwrap();
        let token = jwt
            .encode_claims(&AccessClaims::new("identity-1", Duration::hours(1)).with_domain_user_id(5))
            .unwrap();
        let auth = BearerAuthenticator::new(jwt);

        let claims = auth.authenticate(None, Some(&token)).unwrap().unwrap();
        assert_eq!(claims.domain_user_id().as_deref(), Some("5"));

        assert!(auth.authenticate(None, None).unwrap().is_none());
        assert!(auth.authenticate(None, Some("garbage")).is_err());
        assert!(auth.authenticate(Some("Token abc"), None).is_err());
    }
}
