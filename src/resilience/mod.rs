//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Health monitor, errored microservice:
//!     → backoff.rs (is the next re-registration due yet?)
//!     → due: run registration; not due: skip this tick
//! ```
//!
//! # Design Decisions
//! - Outbound calls are bounded by client timeouts, not retried inline
//! - Spacing grows with the stored retry count, so it survives restarts

pub mod backoff;

pub use backoff::{calculate_backoff, retry_due};
