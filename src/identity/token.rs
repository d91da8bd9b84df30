//! Service tokens.
//!
//! The gateway calls microservices (`pathInfo`) and itself (filter lookups)
//! as a service principal. Tokens are HS256 JWTs signed with the same secret
//! the [`JwtIdentityResolver`](super::JwtIdentityResolver) verifies with.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign service token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by a service token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub id: String,
    pub service: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Mints short-lived service tokens.
pub struct ServiceTokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl ServiceTokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn mint(&self) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = ServiceClaims {
            id: "microservice".to_string(),
            service: true,
            iat: now,
            exp: now.saturating_add(ttl),
        };
        Ok(encode(&Header::default(), &claims, &self.key)?)
    }
}
