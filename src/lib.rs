//! API gateway library.
//!
//! Dynamic routing from caller-facing endpoints to registered
//! microservices, with filter-driven redirect selection and a
//! self-healing microservice registry.

// Core subsystems
pub mod config;
pub mod http;
pub mod model;
pub mod routing;
pub mod store;

// Request path
pub mod dispatch;
pub mod identity;

// Registry
pub mod registry;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
