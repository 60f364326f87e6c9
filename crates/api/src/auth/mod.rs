//! Token verification.
//!
//! - [`jwt`] -- HS256 access-token generation and validation.
//! - [`TokenVerifier`] -- the seam handlers use to turn a token into a user id.

pub mod jwt;

use async_trait::async_trait;
use meritum_core::types::UserId;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token has no subject")]
    MissingSubject,
}

/// Validates a bearer token and returns the user it was issued to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}
