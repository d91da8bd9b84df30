//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Dispatch engine settings.
    pub dispatch: DispatchConfig,

    /// Microservice registry and health-check settings.
    pub registry: RegistryConfig,

    /// Token signing and application key settings.
    pub auth: AuthConfig,

    /// Control-plane route protection.
    pub admin: AdminConfig,

    /// Endpoint store persistence.
    pub store: StoreConfig,

    /// Alert delivery.
    pub notifications: NotificationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout for control-plane requests in seconds.
    pub request_secs: u64,

    /// Timeout for `pathLive`/`pathInfo` calls in seconds.
    pub health_check_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            health_check_secs: 5,
        }
    }
}

/// Dispatch engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Hide upstream error details from callers.
    pub production: bool,

    /// Base URL used for internal filter lookups.
    /// Defaults to the gateway's own listener on loopback.
    pub internal_url: Option<String>,

    /// Maximum inbound body size buffered for forwarding.
    pub max_body_bytes: usize,

    /// How one redirect is picked when several survive filtering.
    pub selection: SelectionKind,
}

/// Redirect selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Uniformly random among survivors.
    #[default]
    Random,
    /// Rotate per endpoint.
    RoundRobin,
    /// Always the first survivor, in storage order.
    First,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            production: false,
            internal_url: None,
            max_body_bytes: 10 * 1024 * 1024,
            selection: SelectionKind::Random,
        }
    }
}

impl DispatchConfig {
    /// Base URL for filter lookups, defaulting to loopback on the listener port.
    pub fn internal_url(&self, bind_address: &str) -> String {
        if let Some(url) = &self.internal_url {
            return url.trim_end_matches('/').to_string();
        }
        let port = bind_address
            .rsplit_once(':')
            .map(|(_, port)| port)
            .unwrap_or("80");
        format!("http://127.0.0.1:{port}")
    }

    /// Production mode is on when configured or when `GATEWAY_ENV=production`.
    pub fn is_production(&self) -> bool {
        self.production
            || std::env::var("GATEWAY_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false)
    }
}

/// Microservice registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Run the background health-check loops.
    pub health_checks_enabled: bool,

    /// Interval between liveness checks of active microservices.
    pub active_check_interval_secs: u64,

    /// Interval between re-registration attempts of errored microservices.
    pub error_check_interval_secs: u64,

    /// A microservice pending for longer than this is treated as stale.
    pub pending_timeout_secs: u64,

    /// Emit a "down" alert once this many consecutive failures are reached.
    pub alert_after_retries: u32,

    /// Delete a microservice once its retries exceed this count.
    pub delete_after_retries: u32,

    /// Base delay for spacing re-registration attempts.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for spacing re-registration attempts.
    pub retry_max_delay_ms: u64,

    /// Default introspection path when a registration omits one.
    pub default_path_info: String,

    /// Default liveness path when a registration omits one.
    pub default_path_live: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_checks_enabled: true,
            active_check_interval_secs: 30,
            error_check_interval_secs: 60,
            pending_timeout_secs: 120,
            alert_after_retries: 3,
            delete_after_retries: 10,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 300_000,
            default_path_info: "/info".to_string(),
            default_path_live: "/ping".to_string(),
        }
    }
}

/// Token and application key configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for caller tokens and minted service tokens.
    pub jwt_secret: String,

    /// Lifetime of minted service tokens.
    pub service_token_ttl_secs: u64,

    /// Accepted application keys. Empty accepts any non-empty key.
    pub application_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            jwt_secret: "CHANGE_ME_IN_PRODUCTION".to_string(),
            service_token_ttl_secs: 300,
            application_keys: Vec::new(),
        }
    }
}

/// Control-plane protection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Require the bearer key on control-plane routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Store persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file loaded on startup and written on shutdown.
    pub snapshot_path: Option<String>,
}

/// Alert delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook receiving alert JSON. Alerts are only logged when unset.
    pub webhook_url: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
