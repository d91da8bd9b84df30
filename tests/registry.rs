//! Registration, removal and health checking against mock microservices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_gateway::model::MicroserviceStatus;
use api_gateway::registry::{Alert, HealthMonitor, RecordingNotifier};
use api_gateway::store::{EndpointStore, MicroserviceStore};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;
use common::{client, start_backend, start_gateway, test_config, TestGateway};

/// A microservice whose contract and health can change under test.
#[derive(Clone)]
struct MockService {
    contract: Arc<Mutex<Value>>,
    healthy: Arc<AtomicBool>,
    info_delay: Duration,
    authorization: Arc<Mutex<Option<String>>>,
}

impl MockService {
    fn new(contract: Value) -> Self {
        Self {
            contract: Arc::new(Mutex::new(contract)),
            healthy: Arc::new(AtomicBool::new(true)),
            info_delay: Duration::ZERO,
            authorization: Arc::new(Mutex::new(None)),
        }
    }

    fn with_info_delay(mut self, delay: Duration) -> Self {
        self.info_delay = delay;
        self
    }

    fn set_contract(&self, contract: Value) {
        *self.contract.lock().unwrap() = contract;
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    async fn start(&self) -> String {
        let app = Router::new()
            .route("/info", get(info))
            .route("/ping", get(ping))
            .route("/api/{*rest}", get(serve))
            .with_state(self.clone());
        format!("http://{}", start_backend(app).await)
    }
}

async fn info(State(svc): State<MockService>, headers: HeaderMap) -> Response {
    tokio::time::sleep(svc.info_delay).await;
    *svc.authorization.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    if !svc.healthy.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let contract = svc.contract.lock().unwrap().clone();
    Json(contract).into_response()
}

async fn ping(State(svc): State<MockService>) -> StatusCode {
    if svc.healthy.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn serve(Path(rest): Path<String>) -> String {
    format!("served {rest}")
}

fn contract(name: &str, paths: &[&str]) -> Value {
    let endpoints: Vec<Value> = paths
        .iter()
        .map(|path| {
            json!({
                "path": format!("/v1/{path}"),
                "method": "GET",
                "redirect": {"method": "GET", "path": format!("/api/{path}")}
            })
        })
        .collect();
    json!({"name": name, "tags": ["test"], "endpoints": endpoints})
}

async fn register(gateway: &TestGateway, name: &str, url: &str) -> reqwest::Response {
    client()
        .post(gateway.url("/api/v1/microservice"))
        .json(&json!({"name": name, "url": url}))
        .send()
        .await
        .unwrap()
}

async fn endpoints(gateway: &TestGateway) -> Vec<Value> {
    client()
        .get(gateway.url("/api/v1/endpoint"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_then_dispatch_bumps_version_once() {
    let service = MockService::new(contract("dataset", &["dataset"]));
    let url = service.start().await;
    let gateway = start_gateway(test_config()).await;
    let before = gateway.store.current_version().await.unwrap().version;

    let res = register(&gateway, "dataset", &url).await;
    assert_eq!(res.status(), StatusCode::OK);
    let registered: Value = res.json().await.unwrap();
    assert_eq!(registered["status"], "active");
    assert_eq!(registered["tags"], json!(["test"]));

    let res = client().get(gateway.url("/v1/dataset")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "served dataset");

    let after = gateway.store.current_version().await.unwrap().version;
    assert_eq!(after, before + 1);
    assert_eq!(registered["version"], json!(after));

    // The service token sent for the contract is kept but never listed.
    assert!(registered.get("token").is_none());
    let stored = gateway.store.microservices(None).await.unwrap();
    let token = stored[0].token.clone().unwrap();
    let sent = service.authorization.lock().unwrap().clone();
    assert_eq!(sent, Some(format!("Bearer {token}")));
}

#[tokio::test]
async fn test_reduced_reregistration_keeps_shared_endpoints() {
    let first = MockService::new(contract("first", &["a", "a-only", "shared"]));
    let second = MockService::new(contract("second", &["shared"]));
    let first_url = first.start().await;
    let second_url = second.start().await;
    let gateway = start_gateway(test_config()).await;

    assert_eq!(register(&gateway, "first", &first_url).await.status(), StatusCode::OK);
    assert_eq!(register(&gateway, "second", &second_url).await.status(), StatusCode::OK);

    let listed = endpoints(&gateway).await;
    let shared = listed.iter().find(|e| e["path"] == "/v1/shared").unwrap();
    assert_eq!(shared["redirects"].as_array().unwrap().len(), 2);

    first.set_contract(contract("first", &["a"]));
    assert_eq!(register(&gateway, "first", &first_url).await.status(), StatusCode::OK);

    let listed = endpoints(&gateway).await;
    let paths: Vec<&str> = listed.iter().filter_map(|e| e["path"].as_str()).collect();
    assert!(paths.contains(&"/v1/a"));
    assert!(!paths.contains(&"/v1/a-only"));

    let shared = listed.iter().find(|e| e["path"] == "/v1/shared").unwrap();
    let redirects = shared["redirects"].as_array().unwrap();
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0]["url"], json!(second_url));

    let http = client();
    let res = http.get(gateway.url("/v1/a-only")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = http.get(gateway.url("/v1/shared")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "served shared");
}

#[tokio::test]
async fn test_overlapping_registrations_keep_both_routes() {
    let slow = MockService::new(contract("slow", &["slow"]))
        .with_info_delay(Duration::from_millis(500));
    let fast = MockService::new(contract("fast", &["fast"]));
    let slow_url = slow.start().await;
    let fast_url = fast.start().await;
    let gateway = start_gateway(test_config()).await;

    // The slow contract is still in flight when the fast one bumps the clock.
    let (slow_res, fast_res) = tokio::join!(
        register(&gateway, "slow", &slow_url),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            register(&gateway, "fast", &fast_url).await
        }
    );
    assert_eq!(slow_res.status(), StatusCode::OK);
    assert_eq!(fast_res.status(), StatusCode::OK);

    let http = client();
    let res = http.get(gateway.url("/v1/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "served slow");
    let res = http.get(gateway.url("/v1/fast")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let version = gateway.store.current_version().await.unwrap().version;
    let active = gateway
        .store
        .microservices(Some(MicroserviceStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|m| m.version == version));
}

#[tokio::test]
async fn test_reregistration_keeps_endpoint_order() {
    let first = MockService::new(contract("first", &["a", "b"]));
    let second = MockService::new(contract("second", &["c"]));
    let first_url = first.start().await;
    let second_url = second.start().await;
    let gateway = start_gateway(test_config()).await;

    assert_eq!(register(&gateway, "first", &first_url).await.status(), StatusCode::OK);
    assert_eq!(register(&gateway, "second", &second_url).await.status(), StatusCode::OK);
    let paths = |listed: Vec<Value>| -> Vec<String> {
        listed
            .iter()
            .filter_map(|e| e["path"].as_str().map(String::from))
            .collect()
    };
    let before = endpoints(&gateway).await;
    assert_eq!(paths(before.clone()), vec!["/v1/a", "/v1/b", "/v1/c"]);

    assert_eq!(register(&gateway, "first", &first_url).await.status(), StatusCode::OK);
    let after = endpoints(&gateway).await;
    assert_eq!(paths(after.clone()), vec!["/v1/a", "/v1/b", "/v1/c"]);
    assert_eq!(after[0]["id"], before[0]["id"]);
}

#[tokio::test]
async fn test_unreachable_microservice_is_left_in_error() {
    let gateway = start_gateway(test_config()).await;
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let res = register(&gateway, "ghost", &format!("http://{closed}")).await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let errored: Vec<Value> = client()
        .get(gateway.url("/api/v1/microservice?status=error"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0]["name"], "ghost");
    assert_eq!(errored[0]["infoStatus"]["numRetries"], 0);
}

#[tokio::test]
async fn test_delete_removes_routes() {
    let service = MockService::new(contract("dataset", &["dataset"]));
    let url = service.start().await;
    let gateway = start_gateway(test_config()).await;

    let registered: Value = register(&gateway, "dataset", &url).await.json().await.unwrap();
    let id = registered["id"].as_str().unwrap();
    let version = gateway.store.current_version().await.unwrap().version;

    let http = client();
    let res = http
        .delete(gateway.url(&format!("/api/v1/microservice/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http.get(gateway.url("/v1/dataset")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = http
        .get(gateway.url(&format!("/api/v1/microservice/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        gateway.store.current_version().await.unwrap().version,
        version + 1
    );
}

#[tokio::test]
async fn test_health_failures_alert_once_then_restore() {
    let service = MockService::new(contract("dataset", &["dataset"]));
    let url = service.start().await;
    let gateway = start_gateway(test_config()).await;
    assert_eq!(register(&gateway, "dataset", &url).await.status(), StatusCode::OK);

    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = HealthMonitor::new(gateway.registry.clone(), notifier.clone());
    let store = gateway.registry.microservice_store().clone();

    service.set_healthy(false);
    monitor.check_active().await;

    let listed = store.microservices(None).await.unwrap();
    assert_eq!(listed[0].status, MicroserviceStatus::Error);
    assert_eq!(listed[0].info_status.num_retries, 1);
    assert!(notifier.alerts().is_empty());

    monitor.check_errored().await;
    monitor.check_errored().await;

    let listed = store.microservices(None).await.unwrap();
    assert_eq!(listed[0].info_status.num_retries, 3);
    let downs = notifier
        .alerts()
        .into_iter()
        .filter(|a| matches!(a, Alert::Down { .. }))
        .count();
    assert_eq!(downs, 1);

    monitor.check_errored().await;
    assert_eq!(notifier.alerts().len(), 1);

    service.set_healthy(true);
    monitor.check_errored().await;

    let listed = store.microservices(None).await.unwrap();
    assert_eq!(listed[0].status, MicroserviceStatus::Active);
    assert_eq!(listed[0].info_status.num_retries, 0);
    assert!(matches!(notifier.alerts().last(), Some(Alert::Restored { .. })));

    let res = client().get(gateway.url("/v1/dataset")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "served dataset");
}

#[tokio::test]
async fn test_exhausted_retries_delete_the_microservice() {
    let service = MockService::new(contract("dataset", &["dataset"]));
    let url = service.start().await;
    let mut config = test_config();
    config.registry.alert_after_retries = 1;
    config.registry.delete_after_retries = 1;
    let gateway = start_gateway(config).await;
    assert_eq!(register(&gateway, "dataset", &url).await.status(), StatusCode::OK);

    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = HealthMonitor::new(gateway.registry.clone(), notifier.clone());

    service.set_healthy(false);
    monitor.check_active().await;
    monitor.check_errored().await;
    monitor.check_errored().await;

    let store = gateway.registry.microservice_store();
    assert!(store.microservices(None).await.unwrap().is_empty());
    assert!(matches!(notifier.alerts().last(), Some(Alert::Removed { num_retries: 2, .. })));

    let res = client().get(gateway.url("/v1/dataset")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_control_plane_requires_admin_key() {
    let mut config = test_config();
    config.admin.enabled = true;
    config.admin.api_key = "secret-key".into();
    let gateway = start_gateway(config).await;
    let http = client();

    let res = http.get(gateway.url("/api/v1/microservice")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = http
        .get(gateway.url("/api/v1/microservice"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = http
        .get(gateway.url("/api/v1/microservice"))
        .bearer_auth("secret-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!([]));

    let res = http.get(gateway.url("/healthz")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
