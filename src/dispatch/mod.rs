//! Dispatch engine.
//!
//! # Data Flow
//! ```text
//! Inbound request (method, path)
//!     → routing cache lookup            (404 when nothing routable)
//!     → request.rs: query/body decode   (app_key consumed, uploads spooled)
//!     → identity resolve                (401 on missing user / app_key)
//!     → filters.rs: concurrent lookups  (results on a private endpoint copy)
//!     → selector.rs: drop failing redirects, strategy picks a survivor
//!     → forwarder.rs: rebuild, inject, send, translate
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Every stage after the lookup works on copies; the cached snapshot is shared
//! - No per-request timeout beyond the HTTP client's defaults

pub mod error;
pub mod filters;
pub mod forwarder;
pub mod headers;
pub mod request;
pub mod selector;
pub mod strategy;

use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};

use crate::identity::IdentityResolver;
use crate::routing::RoutingCache;

pub use error::GatewayError;
pub use filters::FilterEvaluator;
pub use forwarder::RequestForwarder;
pub use request::{InboundBody, InboundRequest};
pub use selector::RedirectSelector;
pub use strategy::{FirstCandidate, RoundRobin, SelectionStrategy, UniformRandom};

/// Ties the dispatch stages together.
pub struct Dispatcher {
    cache: Arc<RoutingCache>,
    identity: Arc<dyn IdentityResolver>,
    filters: FilterEvaluator,
    selector: RedirectSelector,
    forwarder: RequestForwarder,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<RoutingCache>,
        identity: Arc<dyn IdentityResolver>,
        filters: FilterEvaluator,
        selector: RedirectSelector,
        forwarder: RequestForwarder,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            cache,
            identity,
            filters,
            selector,
            forwarder,
            max_body_bytes,
        }
    }

    pub fn cache(&self) -> &Arc<RoutingCache> {
        &self.cache
    }

    /// Route and forward one caller request.
    pub async fn dispatch(&self, request: Request<Body>) -> Result<Response, GatewayError> {
        let path = request.uri().path().to_string();
        let method = request.method().as_str().to_string();

        let route = self.cache.lookup(&path, &method).await?;
        tracing::debug!(
            endpoint = %route.endpoint.path,
            redirects = route.endpoint.redirects.len(),
            "Endpoint matched"
        );

        let inbound = InboundRequest::from_request(request, self.max_body_bytes).await?;

        let identity = self
            .identity
            .resolve(&inbound.headers, inbound.app_key.as_deref())
            .await?;
        if route.endpoint.authenticated && identity.logged_user.is_none() {
            return Err(GatewayError::NotAuthenticated);
        }
        if route.endpoint.application_required && identity.application.is_none() {
            return Err(GatewayError::NotApplicationKey);
        }

        let resolved = self.filters.resolve(&route).await?;
        let redirect = self.selector.choose(&resolved)?;

        self.forwarder
            .forward(inbound, &resolved, &route.params, &redirect, &identity)
            .await
    }
}
