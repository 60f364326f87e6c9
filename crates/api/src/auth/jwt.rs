//! HS256 access tokens.
//!
//! Tokens are issued by the account service. This server only validates
//! them; [`generate_access_token`] exists for local tooling and tests.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use meritum_core::types::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthError, TokenVerifier};

/// JWT claims carried by every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the user's opaque id.
    pub sub: UserId,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier (UUID v4).
    #[serde(default)]
    pub jti: String,
}

/// Configuration for JWT token generation and validation.
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Access token lifetime in minutes (default: 15).
    pub access_token_expiry_mins: i64,
}

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiry_mins: DEFAULT_ACCESS_EXPIRY_MINS,
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_expiry_mins", &self.access_token_expiry_mins)
            .finish()
    }
}

/// Generate an HS256 access token for the given user.
pub fn generate_access_token(
    user_id: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + config.access_token_expiry_mins * 60,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate and decode an access token, returning the embedded [`Claims`].
///
/// Validates the signature and expiration.
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    )?;
    Ok(token_data.claims)
}

/// [`TokenVerifier`] backed by a shared HS256 secret.
#[derive(Debug, Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let claims = validate_token(token, &self.config)?;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Helper to build a test config with a known secret.
    fn test_config() -> JwtConfig {
        JwtConfig::new("test-secret-that-is-long-enough-for-hmac")
    }

    fn sign(claims: &Claims, config: &JwtConfig) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .expect("encoding should succeed")
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let config = test_config();
        let token = generate_access_token("u1", &config).expect("token generation should succeed");

        let claims = validate_token(&token, &config).expect("token validation should succeed");
        assert_eq!(claims.sub, "u1");
        assert!(claims.exp > claims.iat);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn test_expired_token_fails() {
        let config = test_config();

        // Well beyond the default 60-second leeway.
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "u1".to_string(),
            exp: now - 300,
            iat: now - 600,
            jti: Uuid::new_v4().to_string(),
        };

        let result = validate_token(&sign(&claims, &config), &config);
        assert!(result.is_err(), "expired token must fail validation");
    }

    #[test]
    fn test_different_secrets_fail() {
        let token = generate_access_token("u1", &JwtConfig::new("secret-alpha"))
            .expect("token generation should succeed");

        let result = validate_token(&token, &JwtConfig::new("secret-bravo"));
        assert!(result.is_err(), "token signed with a different secret must fail");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("test-secret"));
    }

    #[tokio::test]
    async fn test_verifier_returns_subject() {
        let config = test_config();
        let verifier = JwtVerifier::new(config.clone());
        let token = generate_access_token("user-42", &config).unwrap();

        assert_eq!(verifier.verify(&token).await.unwrap(), "user-42");
    }

    #[tokio::test]
    async fn test_verifier_rejects_blank_subject() {
        let config = test_config();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: " ".to_string(),
            exp: now + 60,
            iat: now,
            jti: String::new(),
        };

        let result = JwtVerifier::new(config.clone())
            .verify(&sign(&claims, &config))
            .await;
        assert_matches!(result, Err(AuthError::MissingSubject));
    }

    #[tokio::test]
    async fn test_verifier_rejects_garbage() {
        let result = JwtVerifier::new(test_config()).verify("not-a-jwt").await;
        assert_matches!(result, Err(AuthError::InvalidToken(_)));
    }
}
