//! # Pet Auth
//!
//! Bearer authentication for the Pet Foundation real-time endpoint.
//!
//! ## Overview
//!
//! The pet-auth crate handles:
//! - **JWT**: Validation of the HMAC-signed access tokens issued by the platform API
//! - **Claims**: Identity resolution (`domain_user_id`, then `nameid`, then `sub`) and roles
//! - **Credentials**: Bearer token from the `Authorization` header or the `access_token` query parameter
//!
//! Token issuance belongs to the API; [`JwtService::encode_claims`] exists for
//! tests and tooling.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pet_auth::{BearerAuthenticator, JwtConfig, JwtService};
//!
//! let jwt = JwtService::new(JwtConfig::from_env()).unwrap();
//! let authenticator = BearerAuthenticator::new(jwt);
//!
//! match authenticator.authenticate(Some("Bearer eyJ..."), None) {
//!     Ok(Some(claims)) => println!("user {:?}", claims.domain_user_id()),
//!     Ok(None) => println!("anonymous"),
//!     Err(e) => println!("rejected with {}", e.status_code()),
//! }
//! ```

pub mod claims;
pub mod credentials;
pub mod error;
pub mod jwt;

// Re-export main types
pub use claims::{AccessClaims, ADMIN_ROLE, DOMAIN_USER_ID_CLAIM};
pub use credentials::{bearer_from_header, select_bearer_token, BearerAuthenticator, ACCESS_TOKEN_PARAM};
pub use error::{AuthError, AuthResult};
pub use jwt::{JwtAlgorithm, JwtConfig, JwtService};
