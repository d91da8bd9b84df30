//! Gateway data model.
//!
//! # Entities
//! ```text
//! Version ── clock for ──▶ Endpoint (path, method) ──▶ Redirect[] ──▶ Filter[]
//!                              ▲
//! Microservice ── declares ────┘  (EndpointDescriptor, merged by the registry)
//! ```
//!
//! Everything here is plain serde data; behaviour lives in `routing`,
//! `dispatch` and `registry`.

pub mod compare;
pub mod endpoint;
pub mod microservice;
pub mod version;

pub use compare::{check_compare, Compare, Condition};
pub use endpoint::{Endpoint, Filter, FilterResult, Redirect};
pub use microservice::{
    EndpointDescriptor, FilterDescriptor, InfoStatus, Microservice, MicroserviceInfo,
    MicroserviceStatus, RedirectDescriptor, RegistrationRequest,
};
pub use version::Version;
