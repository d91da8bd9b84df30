//! Filter evaluation.
//!
//! # Responsibilities
//! - Issue every filter lookup of an endpoint concurrently
//! - Attach each lookup's outcome to a private copy of the endpoint
//!
//! # Design Decisions
//! - Lookups go to the gateway's own internal URL as a service principal
//! - A lookup failure of any kind only makes that filter unsatisfied
//! - Only failing to prepare the lookups at all is a `FilterError`

use std::sync::Arc;

use futures_util::future::join_all;
use reqwest::{header::AUTHORIZATION, Method, StatusCode};
use serde_json::Value;

use crate::dispatch::GatewayError;
use crate::identity::ServiceTokenIssuer;
use crate::model::{Endpoint, Filter, FilterResult};
use crate::observability::metrics;
use crate::routing::template::{self, PathParams};
use crate::routing::RouteMatch;

/// Resolves filter lookups for matched endpoints.
pub struct FilterEvaluator {
    client: reqwest::Client,
    internal_url: String,
    tokens: Arc<ServiceTokenIssuer>,
}

impl FilterEvaluator {
    pub fn new(client: reqwest::Client, internal_url: String, tokens: Arc<ServiceTokenIssuer>) -> Self {
        Self {
            client,
            internal_url,
            tokens,
        }
    }

    /// A copy of the matched endpoint with every filter's result attached.
    pub async fn resolve(&self, route: &RouteMatch) -> Result<Endpoint, GatewayError> {
        let mut endpoint = Endpoint::clone(&route.endpoint);

        let slots: Vec<(usize, usize)> = endpoint
            .redirects
            .iter()
            .enumerate()
            .flat_map(|(r, redirect)| (0..redirect.filters.len()).map(move |f| (r, f)))
            .collect();
        if slots.is_empty() {
            return Ok(endpoint);
        }

        let token = self
            .tokens
            .mint()
            .map_err(|e| GatewayError::FilterError(e.to_string()))?;

        let lookups = slots.iter().map(|&(r, f)| {
            let filter = &endpoint.redirects[r].filters[f];
            self.lookup(filter, &route.params, &token)
        });
        let results = join_all(lookups).await;

        for (&(r, f), result) in slots.iter().zip(results) {
            endpoint.redirects[r].filters[f].result = Some(result);
        }
        Ok(endpoint)
    }

    async fn lookup(&self, filter: &Filter, params: &PathParams, token: &str) -> FilterResult {
        let path = template::render(&filter.path, &filter_bindings(filter, params));
        let url = format!("{}{}", self.internal_url, path);
        let method = if filter.method.eq_ignore_ascii_case("POST") {
            Method::POST
        } else {
            Method::GET
        };

        let response = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await;

        let outcome = match response {
            Ok(response) if response.status() == StatusCode::OK => {
                match response.json::<Value>().await {
                    Ok(data) => Ok(data),
                    Err(e) => Err(format!("unreadable body: {e}")),
                }
            }
            Ok(response) => Err(format!("status {}", response.status())),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(data) => {
                metrics::record_filter_lookup("satisfied");
                FilterResult::satisfied(data)
            }
            Err(reason) => {
                tracing::debug!(filter = %filter.name, url = %url, reason = %reason, "Filter lookup unsatisfied");
                metrics::record_filter_lookup("unsatisfied");
                FilterResult::unsatisfied()
            }
        }
    }
}

/// Endpoint captures renamed to the filter's capture names.
fn filter_bindings(filter: &Filter, params: &PathParams) -> PathParams {
    filter
        .params
        .iter()
        .filter_map(|(endpoint_key, filter_key)| {
            params
                .get(endpoint_key)
                .map(|value| (filter_key.clone(), value.clone()))
        })
        .collect()
}
