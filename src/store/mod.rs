//! Endpoint and microservice storage.
//!
//! # Data Flow
//! ```text
//! registry (writes) ──▶ EndpointStore / MicroserviceStore ◀── routing cache (reads)
//!                              │
//!                              └── Version row: bumped by the registry,
//!                                  polled by the cache on every lookup
//! ```
//!
//! # Design Decisions
//! - Storage is behind async traits so a database can replace `MemoryStore`
//! - Registration claims are a single conditional write, not read-then-write
//! - Bumping the clock carries live rows into the new generation
//! - Endpoint merges read the generation and write under one lock

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Endpoint, Microservice, MicroserviceStatus, Version};

pub use memory::MemoryStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another registration of the same `(url, version)` holds the claim.
    #[error("registration already in progress for {url} (version {version})")]
    RegistrationInProgress { url: String, version: u64 },

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a successful registration claim.
#[derive(Debug, Clone)]
pub enum Claim {
    /// No microservice existed for `(url, version)`; the candidate was stored.
    Created(Microservice),
    /// An existing microservice was moved back to `pending`.
    Reclaimed {
        microservice: Microservice,
        previous: MicroserviceStatus,
    },
}

impl Claim {
    pub fn microservice(&self) -> &Microservice {
        match self {
            Claim::Created(ms) => ms,
            Claim::Reclaimed { microservice, .. } => microservice,
        }
    }

    pub fn into_microservice(self) -> Microservice {
        match self {
            Claim::Created(ms) => ms,
            Claim::Reclaimed { microservice, .. } => microservice,
        }
    }
}

/// Durable endpoint collection plus the version clock.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Read the clock.
    async fn current_version(&self) -> StoreResult<Version>;

    /// Advance the clock and carry live rows into the new generation.
    async fn bump_version(&self) -> StoreResult<Version>;

    /// Endpoints of `version` not marked for deletion, in storage order.
    async fn live_endpoints(&self, version: u64) -> StoreResult<Vec<Endpoint>>;

    /// Insert or replace by id, keeping the original storage position.
    async fn save_endpoint(&self, endpoint: Endpoint) -> StoreResult<()>;

    /// Merge `candidate` into the current generation in one step.
    ///
    /// The live endpoint for the same `(path, method)` takes the candidate's
    /// redirects (replacing those with the same url) and cache lists. Without
    /// a live one, a soft-deleted endpoint for the route is revived in its
    /// storage position; otherwise the candidate is appended. The stored
    /// endpoint is stamped with the current version and returned.
    async fn merge_endpoint(&self, candidate: Endpoint) -> StoreResult<Endpoint>;

    /// Drop the redirects owned by `url` from the live `(path, method)`
    /// endpoint of the current generation.
    ///
    /// Returns the updated endpoint when a redirect was removed; an endpoint
    /// left without redirects is soft-deleted.
    async fn detach_redirects(
        &self,
        path: &str,
        method: &str,
        url: &str,
    ) -> StoreResult<Option<Endpoint>>;

    /// Drop every endpoint of `version` or older flagged `to_delete`.
    async fn purge_deleted_endpoints(&self, version: u64) -> StoreResult<usize>;
}

/// Durable microservice collection.
#[async_trait]
pub trait MicroserviceStore: Send + Sync {
    /// Atomically claim `(candidate.url, candidate.version)` for registration.
    ///
    /// Fails with [`StoreError::RegistrationInProgress`] when a microservice
    /// for that key is `pending` and was updated less than `stale_after` ago.
    async fn claim_registration(
        &self,
        candidate: Microservice,
        stale_after: Duration,
    ) -> StoreResult<Claim>;

    async fn save_microservice(&self, microservice: Microservice) -> StoreResult<()>;

    async fn get_microservice(&self, id: Uuid) -> StoreResult<Option<Microservice>>;

    /// All microservices, optionally restricted to one status.
    async fn microservices(
        &self,
        status: Option<MicroserviceStatus>,
    ) -> StoreResult<Vec<Microservice>>;

    /// Returns whether a document was removed.
    async fn delete_microservice(&self, id: Uuid) -> StoreResult<bool>;
}
