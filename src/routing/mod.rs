//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → cache.rs (compare cached clock with stored clock, reload on change)
//!     → linear scan: method equality + compiled path matcher
//!     → Return: RouteMatch { endpoint, params } or EndpointNotFound
//!
//! Registration (elsewhere):
//!     path template → template.rs compile → persisted pattern + keys
//! ```
//!
//! # Design Decisions
//! - Templates compiled at registration; snapshots compile patterns once per generation
//! - First match wins in storage order; no specificity ranking
//! - Snapshot swap is whole-table, never incremental

pub mod cache;
pub mod template;

pub use cache::{RouteMatch, RoutingCache, RoutingSnapshot};
pub use template::PathParams;
