//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Cross-field checks (alert threshold below deletion threshold)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("registry.delete_after_retries ({delete}) must be >= registry.alert_after_retries ({alert})")]
    RetryThresholds { alert: u32, delete: u32 },

    #[error("auth.jwt_secret must not be empty")]
    EmptySecret,

    #[error("admin.api_key must be changed when the admin guard is enabled")]
    PlaceholderAdminKey,

    #[error("{field}: path '{value}' must start with '/'")]
    InvalidPath { field: &'static str, value: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let registry = &config.registry;
    let nonzero = [
        ("registry.active_check_interval_secs", registry.active_check_interval_secs),
        ("registry.error_check_interval_secs", registry.error_check_interval_secs),
        ("timeouts.health_check_secs", config.timeouts.health_check_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("auth.service_token_ttl_secs", config.auth.service_token_ttl_secs),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if registry.delete_after_retries < registry.alert_after_retries {
        errors.push(ValidationError::RetryThresholds {
            alert: registry.alert_after_retries,
            delete: registry.delete_after_retries,
        });
    }

    for (field, value) in [
        ("registry.default_path_info", &registry.default_path_info),
        ("registry.default_path_live", &registry.default_path_live),
    ] {
        if !value.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                field,
                value: value.clone(),
            });
        }
    }

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    }

    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        errors.push(ValidationError::PlaceholderAdminKey);
    }

    for (field, value) in [
        ("dispatch.internal_url", &config.dispatch.internal_url),
        ("notifications.webhook_url", &config.notifications.webhook_url),
    ] {
        if let Some(value) = value {
            if url::Url::parse(value).is_err() {
                errors.push(ValidationError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
