//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → /healthz, /api/v1/*  → admin.rs (bearer auth, registry calls)
//!     → anything else        → dispatch engine
//!     → Send to client
//! ```

pub mod admin;
pub mod server;

pub use server::{AppState, HttpServer};
