//! End-to-end dispatch through a running gateway.

use std::collections::HashMap;

use api_gateway::model::{Endpoint, EndpointDescriptor, Redirect};
use api_gateway::store::{EndpointStore, MemoryStore};
use axum::{
    extract::{Multipart, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

mod common;
use common::{client, start_backend, start_gateway, test_config, Captured};

/// Store an endpoint declared as `descriptor`, redirecting to `backend`.
async fn seed(store: &MemoryStore, backend: &str, microservice: &str, descriptor: Value) {
    let descriptor: EndpointDescriptor = serde_json::from_value(descriptor).unwrap();
    let redirect = Redirect::new(
        backend,
        microservice,
        &descriptor.redirect,
        descriptor.filters(),
    )
    .unwrap();
    let version = store.current_version().await.unwrap().version;
    let endpoint = Endpoint::from_descriptor(&descriptor, redirect, version).unwrap();
    store.save_endpoint(endpoint).await.unwrap();
}

fn query_recorder(captured: Captured) -> impl Fn(Query<HashMap<String, String>>) -> std::future::Ready<&'static str> + Clone {
    move |Query(query): Query<HashMap<String, String>>| {
        captured.record(json!(query));
        std::future::ready("ok")
    }
}

#[tokio::test]
async fn test_post_body_gets_logged_user() {
    let captured = Captured::default();
    let recorder = captured.clone();
    let backend = start_backend(Router::new().route(
        "/api/v1/dataset",
        post(move |Json(body): Json<Value>| {
            recorder.record(body);
            std::future::ready("ok")
        }),
    ))
    .await;

    let gateway = start_gateway(test_config()).await;
    seed(
        &gateway.store,
        &format!("http://{backend}"),
        "dataset",
        json!({
            "path": "/v1/dataset",
            "method": "POST",
            "redirect": {"method": "POST", "path": "/api/v1/dataset"}
        }),
    )
    .await;

    let res = client()
        .post(gateway.url("/v1/dataset"))
        .json(&json!({"a": 1}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ok");
    assert_eq!(captured.last(), Some(json!({"a": 1, "loggedUser": null})));
}

#[tokio::test]
async fn test_get_injects_into_query_and_binds_captures() {
    let captured = Captured::default();
    let recorder = captured.clone();
    let backend = start_backend(Router::new().route(
        "/api/v1/dataset/{id}",
        get(
            move |Path(id): Path<String>, Query(query): Query<HashMap<String, String>>| {
                recorder.record(json!({"id": id, "query": query}));
                std::future::ready("ok")
            },
        ),
    ))
    .await;

    let gateway = start_gateway(test_config()).await;
    seed(
        &gateway.store,
        &format!("http://{backend}"),
        "dataset",
        json!({
            "path": "/v1/dataset/:dataset",
            "redirect": {"path": "/api/v1/dataset/:dataset"}
        }),
    )
    .await;

    let res = client()
        .get(gateway.url("/v1/dataset/abc?page=2&app_key=k1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = captured.last().unwrap();
    assert_eq!(seen["id"], "abc");
    assert_eq!(seen["query"]["page"], "2");
    assert_eq!(seen["query"]["loggedUser"], "null");
    let app_key: Value = serde_json::from_str(seen["query"]["app_key"].as_str().unwrap()).unwrap();
    assert_eq!(app_key, json!({"key": "k1"}));
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let gateway = start_gateway(test_config()).await;

    let res = client().get(gateway.url("/v1/nothing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({"errors": [{"status": 404, "detail": "Endpoint not found"}]})
    );
}

#[tokio::test]
async fn test_authentication_and_app_key_requirements() {
    let captured = Captured::default();
    let backend = start_backend(
        Router::new()
            .route("/api/private", get(query_recorder(captured.clone())))
            .route("/api/app", get(query_recorder(captured.clone()))),
    )
    .await;

    let mut config = test_config();
    config.auth.jwt_secret = "test-secret".into();
    let gateway = start_gateway(config).await;
    let url = format!("http://{backend}");
    seed(
        &gateway.store,
        &url,
        "private",
        json!({"path": "/v1/private", "authenticated": true, "redirect": {"path": "/api/private"}}),
    )
    .await;
    seed(
        &gateway.store,
        &url,
        "app",
        json!({"path": "/v1/app", "applicationRequired": true, "redirect": {"path": "/api/app"}}),
    )
    .await;

    let http = client();

    let res = http.get(gateway.url("/v1/private")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"][0]["detail"], "Not authenticated");

    let claims = json!({
        "id": "u1",
        "role": "ADMIN",
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();
    let res = http
        .get(gateway.url("/v1/private"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value =
        serde_json::from_str(captured.last().unwrap()["loggedUser"].as_str().unwrap()).unwrap();
    assert_eq!(user["id"], "u1");

    let res = http.get(gateway.url("/v1/app")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"][0]["detail"], "Required app_key");

    let res = http
        .get(gateway.url("/v1/app"))
        .header("app_key", "k1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_filters_decide_the_redirect() {
    let captured = Captured::default();
    let recorder = query_recorder(captured.clone());
    let backend = start_backend(
        Router::new()
            .route("/api/v1/query", get(recorder))
            .route(
                "/api/v1/dataset/{id}",
                get(|| async { Json(json!({"provider": "cartodb"})) }),
            )
            .route(
                "/api/v1/layer/{id}",
                get(|Path(id): Path<String>| async move {
                    if id == "missing" {
                        (StatusCode::NOT_FOUND, Json(json!({"errors": []})))
                    } else {
                        (StatusCode::OK, Json(json!({"status": "saved"})))
                    }
                }),
            ),
    )
    .await;

    let gateway = start_gateway(test_config()).await;
    let url = format!("http://{backend}");
    seed(
        &gateway.store,
        &url,
        "dataset",
        json!({"path": "/v1/dataset/:id", "redirect": {"path": "/api/v1/dataset/:id"}}),
    )
    .await;
    seed(
        &gateway.store,
        &url,
        "layer",
        json!({"path": "/v1/layer/:id", "redirect": {"path": "/api/v1/layer/:id"}}),
    )
    .await;
    seed(
        &gateway.store,
        &url,
        "query",
        json!({
            "path": "/v1/query/:dataset",
            "redirect": {"path": "/api/v1/query"},
            "filters": [
                {
                    "name": "dataset",
                    "path": "/v1/dataset/:id",
                    "params": {"dataset": "id"},
                    "compare": {"provider": "cartodb"}
                },
                {
                    "name": "layer",
                    "path": "/v1/layer/:id",
                    "params": {"dataset": "id"},
                    "compare": {"status": "saved"},
                    "condition": "AND"
                }
            ]
        }),
    )
    .await;

    let http = client();

    let res = http.get(gateway.url("/v1/query/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let seen = captured.last().unwrap();
    let dataset: Value = serde_json::from_str(seen["dataset"].as_str().unwrap()).unwrap();
    assert_eq!(dataset, json!({"provider": "cartodb"}));
    let layer: Value = serde_json::from_str(seen["layer"].as_str().unwrap()).unwrap();
    assert_eq!(layer, json!({"status": "saved"}));

    let res = http.get(gateway.url("/v1/query/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"][0]["detail"], "Endpoint not found");
    assert_eq!(captured.all().len(), 1);
}

#[tokio::test]
async fn test_upstream_errors_are_translated() {
    let backend = start_backend(
        Router::new()
            .route(
                "/api/structured",
                get(|| async {
                    (
                        StatusCode::BAD_REQUEST,
                        [("cache-control", "no-store"), ("x-internal", "secret")],
                        Json(json!({"errors": [{"status": 400, "detail": "bad name"}]})),
                    )
                }),
            )
            .route(
                "/api/plain",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable") }),
            ),
    )
    .await;

    let gateway = start_gateway(test_config()).await;
    let url = format!("http://{backend}");
    seed(
        &gateway.store,
        &url,
        "svc",
        json!({"path": "/v1/structured", "redirect": {"path": "/api/structured"}}),
    )
    .await;
    seed(
        &gateway.store,
        &url,
        "svc",
        json!({"path": "/v1/plain", "redirect": {"path": "/api/plain"}}),
    )
    .await;

    let http = client();

    let res = http.get(gateway.url("/v1/structured")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.headers()["content-type"], "application/json");
    assert!(res.headers().get("x-internal").is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"][0]["detail"], "bad name");

    let res = http.get(gateway.url("/v1/plain")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"][0]["detail"], "database unavailable");
}

#[tokio::test]
async fn test_caller_query_cannot_spoof_logged_user() {
    let captured = Captured::default();
    let recorder = captured.clone();
    let backend = start_backend(Router::new().route(
        "/api/v1/dataset",
        get(move |Query(pairs): Query<Vec<(String, String)>>| {
            recorder.record(json!(pairs));
            std::future::ready("ok")
        }),
    ))
    .await;

    let gateway = start_gateway(test_config()).await;
    seed(
        &gateway.store,
        &format!("http://{backend}"),
        "dataset",
        json!({"path": "/v1/dataset", "redirect": {"path": "/api/v1/dataset"}}),
    )
    .await;

    let res = client()
        .get(gateway.url("/v1/dataset"))
        .query(&[("loggedUser", r#"{"id":"admin","role":"ADMIN"}"#), ("page", "2")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let pairs = captured.last().unwrap();
    let users: Vec<&Value> = pairs
        .as_array()
        .unwrap()
        .iter()
        .filter(|pair| pair[0] == "loggedUser")
        .collect();
    assert_eq!(users, vec![&json!(["loggedUser", "null"])]);
    assert!(pairs.as_array().unwrap().contains(&json!(["page", "2"])));
}

#[tokio::test]
async fn test_multipart_upload_is_forwarded_with_fields() {
    let captured = Captured::default();
    let recorder = captured.clone();
    let backend = start_backend(Router::new().route(
        "/api/v1/upload",
        post(move |mut multipart: Multipart| {
            let recorder = recorder.clone();
            async move {
                let mut seen = serde_json::Map::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    let name = field.name().unwrap_or_default().to_string();
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let text = field.text().await.unwrap();
                    seen.insert(
                        name,
                        json!({"fileName": file_name, "contentType": content_type, "text": text}),
                    );
                }
                recorder.record(Value::Object(seen));
                "ok"
            }
        }),
    ))
    .await;

    let gateway = start_gateway(test_config()).await;
    seed(
        &gateway.store,
        &format!("http://{backend}"),
        "upload",
        json!({
            "path": "/v1/upload",
            "method": "POST",
            "redirect": {"method": "POST", "path": "/api/v1/upload"}
        }),
    )
    .await;

    let file = reqwest::multipart::Part::bytes(b"a,b\n1,2\n".to_vec())
        .file_name("data.csv")
        .mime_str("text/csv")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("name", "population")
        .part("file", file);
    let res = client()
        .post(gateway.url("/v1/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = captured.last().unwrap();
    assert_eq!(seen["name"]["text"], "population");
    assert_eq!(seen["loggedUser"]["text"], "null");
    assert_eq!(seen["file"]["fileName"], "data.csv");
    assert_eq!(seen["file"]["contentType"], "text/csv");
    assert_eq!(seen["file"]["text"], "a,b\n1,2\n");
}

#[tokio::test]
async fn test_binary_endpoint_streams_response() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let served = payload.clone();
    let backend = start_backend(Router::new().route(
        "/api/v1/download",
        get(move || {
            let served = served.clone();
            async move {
                (
                    StatusCode::ACCEPTED,
                    [
                        ("content-type", "application/octet-stream"),
                        ("cache-control", "max-age=60"),
                        ("x-internal", "secret"),
                    ],
                    served,
                )
            }
        }),
    ))
    .await;

    let gateway = start_gateway(test_config()).await;
    seed(
        &gateway.store,
        &format!("http://{backend}"),
        "download",
        json!({
            "path": "/v1/download",
            "binary": true,
            "redirect": {"path": "/api/v1/download"}
        }),
    )
    .await;

    let res = client().get(gateway.url("/v1/download")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.headers()["content-type"], "application/octet-stream");
    assert_eq!(res.headers()["cache-control"], "max-age=60");
    assert!(res.headers().get("x-internal").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), payload.as_slice());
}
