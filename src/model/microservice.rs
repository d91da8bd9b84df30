//! Registered microservices and the contract they publish.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::compare::{Compare, Condition};

/// Reachability state of a microservice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicroserviceStatus {
    Pending,
    Active,
    Error,
}

impl MicroserviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MicroserviceStatus::Pending => "pending",
            MicroserviceStatus::Active => "active",
            MicroserviceStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for MicroserviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MicroserviceStatus::Pending),
            "active" => Ok(MicroserviceStatus::Active),
            "error" => Ok(MicroserviceStatus::Error),
            other => Err(format!("unknown microservice status '{other}'")),
        }
    }
}

/// Health-check bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoStatus {
    pub last_check: Option<DateTime<Utc>>,
    pub num_retries: u32,
    pub error: Option<String>,
}

/// A registered backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microservice {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub path_info: String,
    pub path_live: String,
    pub status: MicroserviceStatus,
    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,
    #[serde(default)]
    pub cache: Vec<String>,
    #[serde(default)]
    pub uncache: Vec<String>,
    #[serde(default)]
    pub info_status: InfoStatus,
    #[serde(default)]
    pub swagger: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Service token last presented to `pathInfo`; never exposed.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Microservice {
    /// A fresh document in `pending`.
    pub fn pending(request: &RegistrationRequest, path_info: &str, path_live: &str, version: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            url: request.url.clone(),
            path_info: path_info.to_string(),
            path_live: path_live.to_string(),
            status: MicroserviceStatus::Pending,
            endpoints: Vec::new(),
            cache: Vec::new(),
            uncache: Vec::new(),
            info_status: InfoStatus::default(),
            swagger: None,
            tags: request.tags.clone(),
            token: None,
            version,
            created_at: now,
            updated_at: now,
        }
    }

    /// The request that would register this microservice again.
    pub fn registration_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            name: self.name.clone(),
            url: self.url.clone(),
            path_info: Some(self.path_info.clone()),
            path_live: Some(self.path_live.clone()),
            tags: self.tags.clone(),
        }
    }
}

/// Body of a registration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub path_info: Option<String>,
    #[serde(default)]
    pub path_live: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Target of a declared endpoint on the microservice itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectDescriptor {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
}

/// Filter as declared by a microservice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub name: String,
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub compare: Option<Compare>,
    #[serde(default)]
    pub condition: Condition,
}

/// Endpoint as declared by a microservice's info contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub redirect: RedirectDescriptor,
    #[serde(default)]
    pub filters: Option<Vec<FilterDescriptor>>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub application_required: bool,
    #[serde(default)]
    pub binary: bool,
}

impl EndpointDescriptor {
    pub fn filters(&self) -> &[FilterDescriptor] {
        self.filters.as_deref().unwrap_or_default()
    }
}

/// Legacy `urls` entry, normalized into an [`EndpointDescriptor`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUrl {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub endpoint: RedirectDescriptor,
    #[serde(default)]
    pub filters: Option<Vec<FilterDescriptor>>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub application_required: bool,
    #[serde(default)]
    pub binary: bool,
}

impl From<LegacyUrl> for EndpointDescriptor {
    fn from(legacy: LegacyUrl) -> Self {
        Self {
            path: legacy.url,
            method: legacy.method,
            redirect: legacy.endpoint,
            filters: legacy.filters,
            authenticated: legacy.authenticated,
            application_required: legacy.application_required,
            binary: legacy.binary,
        }
    }
}

/// Payload served by a microservice's `pathInfo`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicroserviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub swagger: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub endpoints: Option<Vec<EndpointDescriptor>>,
    #[serde(default)]
    pub urls: Option<Vec<LegacyUrl>>,
    #[serde(default)]
    pub cache: Vec<String>,
    #[serde(default)]
    pub uncache: Vec<String>,
}

impl MicroserviceInfo {
    /// Declared endpoints, folding the legacy `urls` shape into the current one.
    pub fn normalized_endpoints(&self) -> Vec<EndpointDescriptor> {
        let mut endpoints = self.endpoints.clone().unwrap_or_default();
        if let Some(urls) = &self.urls {
            endpoints.extend(urls.iter().cloned().map(EndpointDescriptor::from));
        }
        endpoints
    }
}

fn default_method() -> String {
    "GET".to_string()
}
