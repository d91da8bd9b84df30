//! Routable endpoints and their redirects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::model::compare::{Compare, Condition};
use crate::model::microservice::{EndpointDescriptor, FilterDescriptor, RedirectDescriptor};
use crate::routing::template::{self, TemplateError};

/// A routable `(path, method)` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: Uuid,
    pub path: String,
    pub method: String,
    /// Serialized matcher compiled from `path`.
    pub path_regex: String,
    /// Capture names, in capture-group order.
    pub path_keys: Vec<String>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub application_required: bool,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub cache: Vec<String>,
    #[serde(default)]
    pub uncache: Vec<String>,
    pub version: u64,
    #[serde(default)]
    pub to_delete: bool,
    pub redirects: Vec<Redirect>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// Build a new endpoint for a declared descriptor with a single redirect.
    pub fn from_descriptor(
        descriptor: &EndpointDescriptor,
        redirect: Redirect,
        version: u64,
    ) -> Result<Self, TemplateError> {
        let compiled = template::compile(&descriptor.path)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            path: descriptor.path.clone(),
            method: descriptor.method.to_ascii_uppercase(),
            path_regex: compiled.pattern,
            path_keys: compiled.keys,
            authenticated: descriptor.authenticated,
            application_required: descriptor.application_required,
            binary: descriptor.binary,
            cache: Vec::new(),
            uncache: Vec::new(),
            version,
            to_delete: false,
            redirects: vec![redirect],
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the redirect owned by the same url, or append `redirect`.
    pub fn merge_redirect(&mut self, redirect: Redirect) {
        match self.redirects.iter_mut().find(|r| r.url == redirect.url) {
            Some(current) => *current = redirect,
            None => self.redirects.push(redirect),
        }
    }

    /// Drop every redirect owned by `url`; returns whether any was removed.
    ///
    /// An endpoint left without redirects is flagged `to_delete`.
    pub fn detach_redirects(&mut self, url: &str) -> bool {
        let before = self.redirects.len();
        self.redirects.retain(|r| r.url != url);
        if self.redirects.is_empty() {
            self.to_delete = true;
        }
        self.redirects.len() != before
    }

    /// Declared for `(path, method)`, ignoring generation and deletion state.
    pub fn is_route(&self, path: &str, method: &str) -> bool {
        self.path == path && self.method.eq_ignore_ascii_case(method)
    }
}

/// One forwarding target of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub path: String,
    pub url: String,
    pub method: String,
    /// Owning microservice name.
    pub microservice: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Filter data collected while selecting this redirect; forwarded upstream.
    #[serde(skip)]
    pub data: Map<String, Value>,
}

impl Redirect {
    pub fn new(
        url: &str,
        microservice: &str,
        target: &RedirectDescriptor,
        filters: &[FilterDescriptor],
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            path: target.path.clone(),
            url: url.to_string(),
            method: target.method.to_ascii_uppercase(),
            microservice: microservice.to_string(),
            filters: filters
                .iter()
                .map(Filter::from_descriptor)
                .collect::<Result<_, _>>()?,
            data: Map::new(),
        })
    }
}

/// Conditional precondition of a redirect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub name: String,
    pub path: String,
    pub method: String,
    pub path_regex: String,
    pub path_keys: Vec<String>,
    /// Endpoint capture name → filter capture name.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub compare: Option<Compare>,
    #[serde(default)]
    pub condition: Condition,
    /// Lookup outcome; only populated during a dispatch.
    #[serde(skip)]
    pub result: Option<FilterResult>,
}

impl Filter {
    pub fn from_descriptor(descriptor: &FilterDescriptor) -> Result<Self, TemplateError> {
        let compiled = template::compile(&descriptor.path)?;
        Ok(Self {
            name: descriptor.name.clone(),
            path: descriptor.path.clone(),
            method: descriptor.method.to_ascii_uppercase(),
            path_regex: compiled.pattern,
            path_keys: compiled.keys,
            params: descriptor.params.clone(),
            compare: descriptor.compare.clone(),
            condition: descriptor.condition,
            result: None,
        })
    }

    /// Whether `other` resolves the same lookup as this filter.
    pub fn same_lookup(&self, other: &Filter) -> bool {
        self.name == other.name && self.path == other.path && self.method == other.method
    }
}

/// Outcome of a filter lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub data: Option<Value>,
    pub correct: bool,
}

impl FilterResult {
    pub fn satisfied(data: Value) -> Self {
        Self {
            data: Some(data),
            correct: true,
        }
    }

    pub fn unsatisfied() -> Self {
        Self {
            data: None,
            correct: false,
        }
    }
}
