//! Caller identity.
//!
//! # Responsibilities
//! - Turn inbound credentials into the `loggedUser` forwarded upstream
//! - Recognize service-to-service principals
//! - Resolve the `app_key` application context
//!
//! # Design Decisions
//! - Dispatch only consumes `CallerIdentity`; the resolver is swappable
//! - Invalid or expired tokens resolve to anonymous; the endpoint's
//!   `authenticated` flag decides whether that is an error

pub mod token;

use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{json, Map, Value};

use crate::config::AuthConfig;
use crate::dispatch::GatewayError;

pub use token::{ServiceTokenIssuer, TokenError};

/// Identity injected into forwarded requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerIdentity {
    /// Forwarded as `loggedUser`; `None` becomes JSON `null`.
    pub logged_user: Option<Value>,
    /// Forwarded as `app_key` when present.
    pub application: Option<Value>,
    /// Caller is another service rather than a user.
    pub service: bool,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn logged_user_value(&self) -> Value {
        self.logged_user.clone().unwrap_or(Value::Null)
    }
}

/// Resolves an inbound request into a [`CallerIdentity`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(
        &self,
        headers: &HeaderMap,
        app_key: Option<&str>,
    ) -> Result<CallerIdentity, GatewayError>;
}

/// Bearer JWT resolver (HS256).
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
    application_keys: HashSet<String>,
}

impl JwtIdentityResolver {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            application_keys: config.application_keys.iter().cloned().collect(),
        }
    }

    fn user_from_token(&self, token: &str) -> (Option<Value>, bool) {
        match decode::<Map<String, Value>>(token, &self.key, &self.validation) {
            Ok(data) => {
                let service = data.claims.get("service") == Some(&Value::Bool(true));
                if service {
                    (Some(json!({ "id": "microservice" })), true)
                } else {
                    (Some(Value::Object(data.claims)), false)
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid bearer token");
                (None, false)
            }
        }
    }

    fn application(&self, app_key: Option<&str>) -> Option<Value> {
        let key = app_key.map(str::trim).filter(|k| !k.is_empty())?;
        if !self.application_keys.is_empty() && !self.application_keys.contains(key) {
            tracing::debug!("Rejected unknown app_key");
            return None;
        }
        Some(json!({ "key": key }))
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(
        &self,
        headers: &HeaderMap,
        app_key: Option<&str>,
    ) -> Result<CallerIdentity, GatewayError> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let (logged_user, service) = match bearer {
            Some(token) => self.user_from_token(token),
            None => (None, false),
        };

        Ok(CallerIdentity {
            logged_user,
            application: self.application(app_key),
            service,
        })
    }
}
