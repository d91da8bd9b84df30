//! Microservice registry.
//!
//! # Data Flow
//! ```text
//! register(request):
//!     claim (url, version) as pending        ── conflict → 409
//!     → drop redirects owned by a previous registration
//!     → info.rs: fetch pathInfo (service token), normalize legacy `urls`
//!     → merge each declared endpoint into the endpoint store
//!     → active, purge soft-deleted endpoints, bump the clock
//!     any failure after the claim → status error, clock untouched
//!
//! health.rs (background):
//!     active  ── pathLive fails ──▶ error ── retries exhausted ──▶ deleted
//!     error / stale pending ── register succeeds ──▶ active
//! ```
//!
//! # Design Decisions
//! - The claim is one conditional write in the store, so two concurrent
//!   registrations of the same `(url, version)` cannot both proceed
//! - Endpoints left without redirects are soft-deleted so a later
//!   registration under the same `(path, method)` creates a fresh one

pub mod health;
pub mod info;
pub mod notifier;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::model::{
    Endpoint, EndpointDescriptor, Microservice, MicroserviceInfo, MicroserviceStatus, Redirect,
    RegistrationRequest,
};
use crate::observability::metrics;
use crate::routing::template;
use crate::store::{Claim, EndpointStore, MicroserviceStore, StoreError};

pub use health::HealthMonitor;
pub use info::InfoClient;
pub use notifier::{Alert, LogNotifier, Notifier, RecordingNotifier, WebhookNotifier};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registration already in progress for {url} (version {version})")]
    Conflict { url: String, version: u64 },

    #[error("failed to fetch microservice info: {0}")]
    InfoFetch(String),

    #[error("invalid microservice info: {0}")]
    InvalidInfo(String),

    #[error("microservice {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RegistrationInProgress { url, version } => {
                RegistryError::Conflict { url, version }
            }
            other => RegistryError::Store(other),
        }
    }
}

/// Registration protocol over the endpoint and microservice stores.
pub struct MicroserviceRegistry {
    endpoints: Arc<dyn EndpointStore>,
    microservices: Arc<dyn MicroserviceStore>,
    info: InfoClient,
    config: RegistryConfig,
}

impl MicroserviceRegistry {
    pub fn new(
        endpoints: Arc<dyn EndpointStore>,
        microservices: Arc<dyn MicroserviceStore>,
        info: InfoClient,
        config: RegistryConfig,
    ) -> Self {
        Self {
            endpoints,
            microservices,
            info,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn info_client(&self) -> &InfoClient {
        &self.info
    }

    pub fn microservice_store(&self) -> &Arc<dyn MicroserviceStore> {
        &self.microservices
    }

    /// Register (or re-register) the microservice at `request.url`.
    pub async fn register(
        &self,
        request: RegistrationRequest,
        version: Option<u64>,
    ) -> Result<Microservice, RegistryError> {
        let version = match version {
            Some(v) => v,
            None => self.endpoints.current_version().await?.version,
        };

        let path_info = request
            .path_info
            .clone()
            .unwrap_or_else(|| self.config.default_path_info.clone());
        let path_live = request
            .path_live
            .clone()
            .unwrap_or_else(|| self.config.default_path_live.clone());
        let candidate = Microservice::pending(&request, &path_info, &path_live, version);
        let stale_after = Duration::from_secs(self.config.pending_timeout_secs);

        let claim = match self.microservices.claim_registration(candidate, stale_after).await {
            Ok(claim) => claim,
            Err(e) => {
                metrics::record_registration("conflict");
                return Err(e.into());
            }
        };
        if let Claim::Reclaimed { microservice, previous } = &claim {
            tracing::info!(
                microservice = %microservice.name,
                url = %microservice.url,
                previous = previous.as_str(),
                "Re-registering microservice"
            );
            self.remove(microservice).await?;
        }

        let mut microservice = claim.into_microservice();
        match self.synchronize(&mut microservice).await {
            Ok(()) => {
                metrics::record_registration("success");
                tracing::info!(
                    microservice = %microservice.name,
                    url = %microservice.url,
                    endpoints = microservice.endpoints.len(),
                    "Microservice registered"
                );
                Ok(microservice)
            }
            Err(e) => {
                metrics::record_registration("failure");
                tracing::warn!(
                    microservice = %microservice.name,
                    url = %microservice.url,
                    error = %e,
                    "Microservice registration failed"
                );
                microservice.status = MicroserviceStatus::Error;
                microservice.info_status.error = Some(e.to_string());
                microservice.info_status.last_check = Some(Utc::now());
                self.microservices.save_microservice(microservice).await?;
                Err(e)
            }
        }
    }

    /// Fetch the contract, merge endpoints, activate and bump the clock.
    async fn synchronize(&self, microservice: &mut Microservice) -> Result<(), RegistryError> {
        let info = self.info.fetch(microservice).await?;
        apply_info(microservice, &info);

        // Build every redirect first so a bad template merges nothing.
        let planned = microservice
            .endpoints
            .iter()
            .map(|descriptor| {
                template::compile(&descriptor.path)
                    .and_then(|_| {
                        Redirect::new(
                            &microservice.url,
                            &microservice.name,
                            &descriptor.redirect,
                            descriptor.filters(),
                        )
                    })
                    .map(|redirect| (descriptor, redirect))
                    .map_err(|e| RegistryError::InvalidInfo(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (descriptor, redirect) in planned {
            self.merge_endpoint(microservice, descriptor, redirect).await?;
        }

        microservice.status = MicroserviceStatus::Active;
        microservice.info_status.num_retries = 0;
        microservice.info_status.error = None;
        microservice.info_status.last_check = Some(Utc::now());
        self.microservices
            .save_microservice(microservice.clone())
            .await?;

        // Other registrations may have bumped the clock since the claim.
        let version = self.endpoints.current_version().await?.version;
        let purged = self.endpoints.purge_deleted_endpoints(version).await?;
        let bumped = self.endpoints.bump_version().await?;
        microservice.version = bumped.version;
        tracing::debug!(purged, version = bumped.version, "Routing version bumped");
        Ok(())
    }

    async fn merge_endpoint(
        &self,
        microservice: &Microservice,
        descriptor: &EndpointDescriptor,
        redirect: Redirect,
    ) -> Result<(), RegistryError> {
        // The store stamps the generation when it merges.
        let mut candidate = Endpoint::from_descriptor(descriptor, redirect, 0)
            .map_err(|e| RegistryError::InvalidInfo(e.to_string()))?;
        candidate.cache = microservice.cache.clone();
        candidate.uncache = microservice.uncache.clone();
        self.endpoints.merge_endpoint(candidate).await?;
        Ok(())
    }

    /// Drop the redirects `microservice` owns from the live endpoints it declared.
    ///
    /// Endpoints left without redirects are soft-deleted; nothing here bumps
    /// the clock.
    pub async fn remove(&self, microservice: &Microservice) -> Result<(), RegistryError> {
        for descriptor in &microservice.endpoints {
            let Some(endpoint) = self
                .endpoints
                .detach_redirects(&descriptor.path, &descriptor.method, &microservice.url)
                .await?
            else {
                continue;
            };
            tracing::debug!(
                microservice = %microservice.name,
                path = %endpoint.path,
                method = %endpoint.method,
                soft_deleted = endpoint.to_delete,
                "Removed microservice redirect"
            );
        }
        Ok(())
    }

    /// Remove a microservice and its exclusively owned endpoints, then bump the clock.
    pub async fn delete(&self, id: Uuid) -> Result<Microservice, RegistryError> {
        let microservice = self
            .microservices
            .get_microservice(id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;

        self.remove(&microservice).await?;
        let version = self.endpoints.current_version().await?.version;
        self.endpoints.purge_deleted_endpoints(version).await?;
        self.microservices.delete_microservice(id).await?;
        self.endpoints.bump_version().await?;

        tracing::info!(
            microservice = %microservice.name,
            url = %microservice.url,
            "Microservice deleted"
        );
        Ok(microservice)
    }
}

/// Copy the fetched contract onto the microservice.
fn apply_info(microservice: &mut Microservice, info: &MicroserviceInfo) {
    if let Some(name) = info.name.as_ref().filter(|n| !n.is_empty()) {
        microservice.name = name.clone();
    }
    microservice.swagger = info.swagger.clone();
    microservice.cache = info.cache.clone();
    microservice.uncache = info.uncache.clone();
    microservice.endpoints = info.normalized_endpoints();

    let mut seen = BTreeSet::new();
    let tags: Vec<String> = microservice
        .tags
        .iter()
        .chain(info.tags.iter())
        .filter(|t| seen.insert(t.to_string()))
        .cloned()
        .collect();
    microservice.tags = tags;
}
