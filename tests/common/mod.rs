//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use api_gateway::config::{GatewayConfig, SelectionKind};
use api_gateway::lifecycle::Shutdown;
use api_gateway::registry::MicroserviceRegistry;
use api_gateway::store::MemoryStore;
use api_gateway::HttpServer;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

/// Start an axum app on an ephemeral loopback port.
pub async fn start_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A running gateway plus handles on its internals.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<MicroserviceRegistry>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config for deterministic tests: first-candidate selection, no background loops.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.dispatch.selection = SelectionKind::First;
    config.registry.health_checks_enabled = false;
    config.registry.retry_base_delay_ms = 0;
    config.registry.retry_max_delay_ms = 0;
    config.timeouts.health_check_secs = 2;
    config.observability.metrics_enabled = false;
    config
}

/// Start a gateway on an ephemeral port.
pub async fn start_gateway(mut config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let store = Arc::new(MemoryStore::new(None));
    let server = HttpServer::new(config, store.clone());
    let registry = server.registry().clone();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    TestGateway {
        addr,
        store,
        registry,
        shutdown,
    }
}

/// Client that never goes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Last value handed to `record`, shared between a mock handler and the test.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<Value>>>);

impl Captured {
    pub fn record(&self, value: Value) {
        self.0.lock().unwrap().push(value);
    }

    pub fn all(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Value> {
        self.0.lock().unwrap().last().cloned()
    }
}
