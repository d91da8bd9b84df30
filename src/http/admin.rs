//! Control-plane handlers.
//!
//! These paths are reserved: they are matched before the dispatch fallback,
//! so no registered endpoint can shadow them.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::error::error_response;
use crate::http::server::AppState;
use crate::model::{MicroserviceStatus, RegistrationRequest};
use crate::registry::RegistryError;

/// Bearer check on the control plane; a no-op when admin auth is disabled.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.admin.enabled {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|key| key == state.admin.api_key);

    if authorized {
        next.run(request).await
    } else {
        error_response(StatusCode::UNAUTHORIZED, "Invalid admin key")
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::Conflict { .. } => StatusCode::CONFLICT,
            RegistryError::InfoFetch(_) | RegistryError::InvalidInfo(_) => StatusCode::BAD_GATEWAY,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, &self.to_string())
    }
}

pub async fn register_microservice(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    match state.registry.register(request, None).await {
        Ok(microservice) => Json(microservice).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

pub async fn list_microservices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<MicroserviceStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    match state.registry.microservice_store().microservices(status).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => RegistryError::from(e).into_response(),
    }
}

pub async fn get_microservice(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.registry.microservice_store().get_microservice(id).await {
        Ok(Some(microservice)) => Json(microservice).into_response(),
        Ok(None) => RegistryError::NotFound(id).into_response(),
        Err(e) => RegistryError::from(e).into_response(),
    }
}

pub async fn delete_microservice(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.registry.delete(id).await {
        Ok(microservice) => Json(microservice).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Endpoints of the current generation, as the router sees them.
pub async fn list_endpoints(State(state): State<AppState>) -> Response {
    match state.dispatcher.cache().current().await {
        Ok(snapshot) => Json(snapshot.endpoints().cloned().collect::<Vec<_>>()).into_response(),
        Err(e) => RegistryError::from(e).into_response(),
    }
}
