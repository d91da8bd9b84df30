//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load snapshot → Build subsystems → Spawn health monitor → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal (signals.rs) → broadcast → server drains, monitor exits
//!     → store snapshot written
//! ```
//!
//! # Design Decisions
//! - Config is validated before startup is entered
//! - Listener binds last, after every subsystem exists

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
