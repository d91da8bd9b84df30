//! Versioned routing cache.
//!
//! # Responsibilities
//! - Hold the endpoints of one generation, with matchers compiled once
//! - Reload the whole snapshot when the stored clock's timestamp changes
//! - First-match lookup by method and path
//!
//! # Design Decisions
//! - Snapshots are immutable and swapped atomically (arc-swap); readers never block
//! - Concurrent reloads may race; the last writer wins and both snapshots are valid
//! - No specificity ranking: storage order decides

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use regex::Regex;

use crate::dispatch::GatewayError;
use crate::model::{Endpoint, Version};
use crate::observability::metrics;
use crate::routing::template::{self, PathParams};
use crate::store::{EndpointStore, StoreResult};

/// A matched endpoint and the values its captures bound.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub endpoint: Arc<Endpoint>,
    pub params: PathParams,
}

#[derive(Debug)]
struct CompiledEndpoint {
    endpoint: Arc<Endpoint>,
    regex: Regex,
}

/// One generation of the routing table.
#[derive(Debug)]
pub struct RoutingSnapshot {
    version: Version,
    entries: Vec<CompiledEndpoint>,
}

impl RoutingSnapshot {
    fn build(version: Version, endpoints: Vec<Endpoint>) -> Self {
        let entries = endpoints
            .into_iter()
            .filter_map(|endpoint| match Regex::new(&endpoint.path_regex) {
                Ok(regex) => Some(CompiledEndpoint {
                    endpoint: Arc::new(endpoint),
                    regex,
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %endpoint.path,
                        method = %endpoint.method,
                        error = %e,
                        "Skipping endpoint with unusable matcher"
                    );
                    None
                }
            })
            .collect();
        Self { version, entries }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.entries.iter().map(|e| e.endpoint.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First endpoint whose method and matcher accept the request.
    pub fn find(&self, path: &str, method: &str) -> Option<RouteMatch> {
        self.entries
            .iter()
            .filter(|e| e.endpoint.method.eq_ignore_ascii_case(method))
            .find_map(|e| {
                template::captures(&e.regex, &e.endpoint.path_keys, path).map(|params| {
                    RouteMatch {
                        endpoint: e.endpoint.clone(),
                        params,
                    }
                })
            })
    }
}

/// Injectable cache over an [`EndpointStore`].
pub struct RoutingCache {
    store: Arc<dyn EndpointStore>,
    snapshot: ArcSwapOption<RoutingSnapshot>,
}

impl RoutingCache {
    pub fn new(store: Arc<dyn EndpointStore>) -> Self {
        Self {
            store,
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// Current snapshot without consulting the store.
    pub fn snapshot(&self) -> Option<Arc<RoutingSnapshot>> {
        self.snapshot.load_full()
    }

    /// Forget the snapshot; the next lookup reloads.
    pub fn invalidate(&self) {
        self.snapshot.store(None);
    }

    /// Snapshot matching the stored clock, reloading if needed.
    pub async fn current(&self) -> StoreResult<Arc<RoutingSnapshot>> {
        let stored = self.store.current_version().await?;

        if let Some(snapshot) = self.snapshot.load_full() {
            if snapshot.version.last_updated == stored.last_updated {
                return Ok(snapshot);
            }
        }

        let endpoints = self.store.live_endpoints(stored.version).await?;
        let snapshot = Arc::new(RoutingSnapshot::build(stored, endpoints));
        tracing::info!(
            version = snapshot.version.version,
            endpoints = snapshot.len(),
            "Routing cache reloaded"
        );
        metrics::record_route_reload(snapshot.len());
        self.snapshot.store(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Resolve `(path, method)` to a routable endpoint.
    pub async fn lookup(&self, path: &str, method: &str) -> Result<RouteMatch, GatewayError> {
        let snapshot = self.current().await?;
        let found = snapshot
            .find(path, method)
            .ok_or(GatewayError::EndpointNotFound)?;

        if found.endpoint.redirects.is_empty() {
            return Err(GatewayError::EndpointNotFound);
        }
        Ok(found)
    }
}
