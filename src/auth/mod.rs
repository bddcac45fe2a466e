//! Channel authentication: inbound bearer validation and outbound tokens.
//!
//! - [`validator`]: validates the `Authorization: Bearer` header of inbound
//!   channel requests ([`InboundAuthenticator`]).
//! - [`token`]: acquires and caches client-credential access tokens for
//!   calling the channel service ([`TokenProvider`]).

pub mod token;
pub mod validator;

pub use token::{AccessToken, ClientCredentialFlow, MsalClient, TokenError, TokenProvider};
pub use validator::{ClaimsIdentity, InboundAuthenticator, JwksCache, JwtTokenValidator};

/// Errors from inbound request authentication.
///
/// Every variant maps to a bare 401 at the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was supplied but the deployment requires one.
    #[error("missing bearer token")]
    MissingToken,
    /// The token header could not be decoded or carries no key id.
    #[error("malformed token: {0}")]
    Malformed(String),
    /// No configured key set holds the token's signing key.
    #[error("signing key not found for kid: {0}")]
    KeyNotFound(String),
    /// Signature, audience, issuer or expiry validation failed.
    #[error("token validation failed: {0}")]
    InvalidToken(String),
    /// Fetching a key set failed.
    #[error("key set fetch failed: {0}")]
    Jwks(String),
}
