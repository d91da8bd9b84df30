//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build every gateway subsystem from config
//! - Create the Axum router: control-plane routes plus the dispatch fallback
//! - Wire up middleware (tracing, request ID, control-plane timeout and auth)
//! - Run the server and the health monitor until shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AdminConfig, GatewayConfig};
use crate::dispatch::{
    strategy, Dispatcher, FilterEvaluator, RedirectSelector, RequestForwarder,
};
use crate::http::admin;
use crate::identity::{IdentityResolver, JwtIdentityResolver, ServiceTokenIssuer};
use crate::observability::metrics;
use crate::registry::{
    HealthMonitor, InfoClient, LogNotifier, MicroserviceRegistry, Notifier, WebhookNotifier,
};
use crate::routing::RoutingCache;
use crate::store::{EndpointStore, MemoryStore, MicroserviceStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<MicroserviceRegistry>,
    pub admin: AdminConfig,
    pub production: bool,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    registry: Arc<MicroserviceRegistry>,
    monitor: HealthMonitor,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig, store: Arc<MemoryStore>) -> Self {
        // Upstreams are internal; environment proxies do not apply.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        let tokens = Arc::new(ServiceTokenIssuer::new(
            &config.auth.jwt_secret,
            Duration::from_secs(config.auth.service_token_ttl_secs),
        ));
        let production = config.dispatch.is_production();
        let endpoints: Arc<dyn EndpointStore> = store.clone();
        let microservices: Arc<dyn MicroserviceStore> = store;

        // Dispatch engine
        let cache = Arc::new(RoutingCache::new(endpoints.clone()));
        let identity: Arc<dyn IdentityResolver> = Arc::new(JwtIdentityResolver::new(&config.auth));
        let internal_url = config
            .dispatch
            .internal_url(&config.listener.bind_address);
        let filters = FilterEvaluator::new(client.clone(), internal_url, tokens.clone());
        let selector = RedirectSelector::new(strategy::from_kind(config.dispatch.selection));
        let forwarder = RequestForwarder::new(client.clone(), production);
        let dispatcher = Arc::new(Dispatcher::new(
            cache,
            identity,
            filters,
            selector,
            forwarder,
            config.dispatch.max_body_bytes,
        ));

        // Registry and health
        let info = InfoClient::new(
            client.clone(),
            Duration::from_secs(config.timeouts.health_check_secs),
            tokens,
        );
        let registry = Arc::new(MicroserviceRegistry::new(
            endpoints,
            microservices,
            info,
            config.registry.clone(),
        ));
        let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(client, url.clone())),
            None => Arc::new(LogNotifier),
        };
        let monitor = HealthMonitor::new(registry.clone(), notifier);

        let state = AppState {
            dispatcher,
            registry: registry.clone(),
            admin: config.admin.clone(),
            production,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            registry,
            monitor,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let control = Router::new()
            .route(
                "/api/v1/microservice",
                get(admin::list_microservices).post(admin::register_microservice),
            )
            .route(
                "/api/v1/microservice/{id}",
                get(admin::get_microservice).delete(admin::delete_microservice),
            )
            .route("/api/v1/endpoint", get(admin::list_endpoints))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin::require_admin_key,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )));

        Router::new()
            .route("/healthz", get(healthz))
            .merge(control)
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The registry behind the control-plane routes.
    pub fn registry(&self) -> &Arc<MicroserviceRegistry> {
        &self.registry
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(self.monitor.run(shutdown.resubscribe()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Catch-all handler: everything that is not a control-plane route is dispatched.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Dispatching request"
    );

    let response = match state.dispatcher.dispatch(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = e.status().as_u16(),
                error = %e,
                "Dispatch failed"
            );
            e.into_response_with(state.production)
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
