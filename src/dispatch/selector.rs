//! Redirect selection.
//!
//! A redirect survives when each of its filters has a satisfied lookup for
//! the same `(name, path, method)` whose data passes the filter's compare
//! tree. Survivors carry the data they were admitted on, keyed by filter
//! name, to the forwarder.

use crate::dispatch::strategy::SelectionStrategy;
use crate::dispatch::GatewayError;
use crate::model::{check_compare, Endpoint, Filter, Redirect};

pub struct RedirectSelector {
    strategy: Box<dyn SelectionStrategy>,
}

impl RedirectSelector {
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Self { strategy }
    }

    /// Pick the redirect to forward to from a filter-resolved endpoint.
    pub fn choose(&self, endpoint: &Endpoint) -> Result<Redirect, GatewayError> {
        let resolved: Vec<&Filter> = endpoint
            .redirects
            .iter()
            .flat_map(|r| r.filters.iter())
            .collect();

        let survivors: Vec<Redirect> = endpoint
            .redirects
            .iter()
            .filter_map(|redirect| admit(redirect, &resolved))
            .collect();

        let index = match survivors.len() {
            0 => None,
            1 => Some(0),
            _ => self.strategy.pick(endpoint, &survivors),
        }
        .ok_or(GatewayError::EndpointNotFound)?;

        survivors
            .into_iter()
            .nth(index)
            .ok_or(GatewayError::EndpointNotFound)
    }
}

/// The redirect with its filter data recorded, or `None` if any filter fails.
fn admit(redirect: &Redirect, resolved: &[&Filter]) -> Option<Redirect> {
    let mut admitted = redirect.clone();

    for filter in &redirect.filters {
        let data = resolved.iter().find_map(|candidate| {
            if !candidate.same_lookup(filter) {
                return None;
            }
            candidate
                .result
                .as_ref()
                .filter(|r| r.correct)
                .map(|r| r.data.clone())
        })?;

        if !check_compare(filter.compare.as_ref(), data.as_ref(), filter.condition) {
            tracing::debug!(
                filter = %filter.name,
                microservice = %redirect.microservice,
                "Redirect rejected by filter"
            );
            return None;
        }
        admitted
            .data
            .insert(filter.name.clone(), data.unwrap_or_default());
    }
    Some(admitted)
}
