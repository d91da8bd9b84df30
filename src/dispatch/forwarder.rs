//! Request forwarding.
//!
//! # Responsibilities
//! - Rebuild the caller request for the chosen redirect
//! - Inject `loggedUser`, `app_key` and filter data
//! - Stream binary responses, buffer and translate the rest
//!
//! # Design Decisions
//! - Injected values go to the query for GET/DELETE (and other bodiless
//!   methods) and into the body for POST/PUT/PATCH
//! - Caller query pairs named like an injected field are dropped
//! - Multipart bodies stringify every non-file value
//! - Upstream errors with an `errors` list pass through untouched

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::{
    multipart::{Form, Part},
    Method,
};
use serde_json::{Map, Value};
use tokio_util::io::ReaderStream;

use crate::dispatch::error::error_response;
use crate::dispatch::headers;
use crate::dispatch::request::{InboundBody, InboundRequest, UploadedFile, APP_KEY};
use crate::dispatch::GatewayError;
use crate::identity::CallerIdentity;
use crate::model::{Endpoint, Redirect};
use crate::routing::template::{self, PathParams};

pub const LOGGED_USER: &str = "loggedUser";

/// Outbound body, before it is handed to reqwest.
#[derive(Debug, PartialEq)]
enum Outbound {
    None,
    Json(Value),
    Raw {
        content_type: Option<String>,
        bytes: bytes::Bytes,
    },
}

pub struct RequestForwarder {
    client: reqwest::Client,
    production: bool,
}

impl RequestForwarder {
    pub fn new(client: reqwest::Client, production: bool) -> Self {
        Self { client, production }
    }

    /// Forward `inbound` to `redirect` and translate the upstream answer.
    ///
    /// Uploaded files are deleted when `inbound` drops at the end of this
    /// call, or earlier if the caller goes away and the future is dropped.
    pub async fn forward(
        &self,
        inbound: InboundRequest,
        endpoint: &Endpoint,
        params: &PathParams,
        redirect: &Redirect,
        identity: &CallerIdentity,
    ) -> Result<Response, GatewayError> {
        let url = target_url(redirect, params)?;
        let method = Method::from_bytes(redirect.method.as_bytes())
            .map_err(|e| GatewayError::Internal(format!("redirect method: {e}")))?;
        let injected = injected_fields(identity, redirect);

        let mut query = outbound_query(&inbound.query, &injected);
        let mut outbound = Outbound::None;
        if carries_body(&method) {
            outbound = build_body(&inbound.body, injected);
        } else {
            query.extend(
                injected
                    .into_iter()
                    .map(|(k, v)| (k, v.to_string())),
            );
        }

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers::outbound_request_headers(&inbound.headers));
        if !query.is_empty() {
            request = request.query(&query);
        }

        request = match (&outbound, inbound.files.is_empty()) {
            (Outbound::Json(Value::Object(fields)), false) => {
                request.multipart(multipart_form(fields, &inbound.files).await?)
            }
            (Outbound::Json(value), _) => request.json(value),
            (Outbound::Raw { content_type, bytes }, _) => {
                if let Some(ct) = content_type {
                    request = request.header(header::CONTENT_TYPE, ct);
                }
                request.body(bytes.clone())
            }
            (Outbound::None, _) => request,
        };

        tracing::debug!(
            method = %method,
            url = %url,
            microservice = %redirect.microservice,
            binary = endpoint.binary,
            "Forwarding request"
        );

        let upstream = request.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Upstream request failed");
            GatewayError::Upstream(e.to_string())
        })?;

        if endpoint.binary {
            return stream_response(upstream);
        }
        self.buffered_response(upstream).await
    }

    async fn buffered_response(&self, upstream: reqwest::Response) -> Result<Response, GatewayError> {
        let status = upstream.status();
        let mut response_headers = HeaderMap::new();
        headers::copy_response_headers(upstream.headers(), &mut response_headers);
        let body = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if status.is_client_error() || status.is_server_error() {
            // The translated body carries its own framing.
            for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH, header::CONTENT_ENCODING] {
                response_headers.remove(name);
            }
            let mut response = self.upstream_error(status, &body);
            response.headers_mut().extend(response_headers);
            return Ok(response);
        }

        let mut response = axum::http::Response::builder()
            .status(status)
            .body(Body::from(body))
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        response.headers_mut().extend(response_headers);
        Ok(response)
    }

    fn upstream_error(&self, status: StatusCode, body: &[u8]) -> Response {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        if let Some(errors) = parsed.as_ref().filter(|v| v.get("errors").is_some_and(Value::is_array)) {
            return (status, axum::Json(errors.clone())).into_response();
        }

        if self.production {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
        let detail = match parsed {
            Some(Value::String(s)) => s,
            Some(Value::Object(o)) if o.get("message").is_some_and(Value::is_string) => {
                o["message"].as_str().unwrap_or_default().to_string()
            }
            _ => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("Upstream error").to_string()
                } else {
                    text
                }
            }
        };
        error_response(status, &detail)
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Redirect path with captures bound, appended to the backend URL.
fn target_url(redirect: &Redirect, params: &PathParams) -> Result<url::Url, GatewayError> {
    let path = template::render(&redirect.path, params);
    let joined = format!("{}{}", redirect.url.trim_end_matches('/'), path);
    url::Url::parse(&joined)
        .map_err(|e| GatewayError::Internal(format!("invalid redirect target '{joined}': {e}")))
}

/// `loggedUser`, `app_key` and filter data, in injection order.
fn injected_fields(identity: &CallerIdentity, redirect: &Redirect) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(LOGGED_USER.to_string(), identity.logged_user_value());
    if let Some(application) = &identity.application {
        fields.insert(APP_KEY.to_string(), application.clone());
    }
    for (name, data) in &redirect.data {
        fields.insert(name.clone(), data.clone());
    }
    fields
}

/// Caller query without any key the gateway injects itself.
fn outbound_query(query: &[(String, String)], injected: &Map<String, Value>) -> Vec<(String, String)> {
    query
        .iter()
        .filter(|(key, _)| !injected.contains_key(key))
        .cloned()
        .collect()
}

fn build_body(body: &InboundBody, injected: Map<String, Value>) -> Outbound {
    let mut fields = match body {
        InboundBody::Empty => Map::new(),
        InboundBody::Form(fields) => fields.clone(),
        InboundBody::Json(Value::Object(fields)) => fields.clone(),
        InboundBody::Json(other) => return Outbound::Json(other.clone()),
        InboundBody::Raw {
            content_type,
            bytes,
        } => {
            return Outbound::Raw {
                content_type: content_type.clone(),
                bytes: bytes.clone(),
            }
        }
    };
    fields.extend(injected);
    Outbound::Json(Value::Object(fields))
}

/// Multipart value of a non-file field.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn multipart_form(fields: &Map<String, Value>, files: &[UploadedFile]) -> Result<Form, GatewayError> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), stringify(value));
    }
    for upload in files {
        let file = tokio::fs::File::open(upload.file.path())
            .await
            .map_err(|e| GatewayError::Internal(format!("temp file: {e}")))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| GatewayError::Internal(format!("temp file: {e}")))?
            .len();
        let stream = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let mut part = Part::stream_with_length(stream, length).file_name(upload.file_name.clone());
        if let Some(ct) = &upload.content_type {
            part = part
                .mime_str(ct)
                .map_err(|e| GatewayError::BadRequest(format!("upload content type: {e}")))?;
        }
        form = form.part(upload.field.clone(), part);
    }
    Ok(form)
}

/// Pipe the upstream body through without buffering it.
fn stream_response(upstream: reqwest::Response) -> Result<Response, GatewayError> {
    let status = upstream.status();
    let mut response_headers = HeaderMap::new();
    headers::copy_response_headers(upstream.headers(), &mut response_headers);

    let mut response = axum::http::Response::builder()
        .status(status)
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    response.headers_mut().extend(response_headers);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RedirectDescriptor;
    use serde_json::json;

    fn redirect(url: &str, path: &str) -> Redirect {
        let target = RedirectDescriptor {
            method: "POST".into(),
            path: path.into(),
        };
        Redirect::new(url, "svc", &target, &[]).unwrap()
    }

    #[test]
    fn test_target_url_binds_captures() {
        let r = redirect("http://svc:6001/", "/api/v1/dataset/:dataset");
        let params = PathParams::from([("dataset".to_string(), "abc".to_string())]);
        assert_eq!(
            target_url(&r, &params).unwrap().as_str(),
            "http://svc:6001/api/v1/dataset/abc"
        );
    }

    #[test]
    fn test_body_injection_adds_null_user() {
        let r = redirect("http://svc:6001", "/api/v1/dataset");
        let injected = injected_fields(&CallerIdentity::anonymous(), &r);
        let body = build_body(&InboundBody::Json(json!({"a": 1})), injected);
        assert_eq!(body, Outbound::Json(json!({"a": 1, "loggedUser": null})));
    }

    #[test]
    fn test_injection_includes_app_key_and_filter_data() {
        let mut r = redirect("http://svc:6001", "/api/v1/dataset");
        r.data.insert("dataset".into(), json!({"provider": "gee"}));
        let identity = CallerIdentity {
            logged_user: Some(json!({"id": "u1"})),
            application: Some(json!({"key": "k"})),
            service: false,
        };

        let injected = injected_fields(&identity, &r);
        assert_eq!(injected["loggedUser"], json!({"id": "u1"}));
        assert_eq!(injected["app_key"], json!({"key": "k"}));
        assert_eq!(injected["dataset"], json!({"provider": "gee"}));
        // Query placement is the JSON text of each value.
        assert_eq!(injected["loggedUser"].to_string(), r#"{"id":"u1"}"#);
    }

    #[test]
    fn test_caller_cannot_supply_injected_query_keys() {
        let injected = injected_fields(&CallerIdentity::anonymous(), &redirect("http://s", "/p"));
        let inbound = vec![
            ("loggedUser".to_string(), r#"{"id":"admin"}"#.to_string()),
            ("page".to_string(), "2".to_string()),
        ];
        assert_eq!(
            outbound_query(&inbound, &injected),
            vec![("page".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_non_object_json_forwarded_as_is() {
        let injected = injected_fields(&CallerIdentity::anonymous(), &redirect("http://s", "/p"));
        let body = build_body(&InboundBody::Json(json!([1, 2])), injected);
        assert_eq!(body, Outbound::Json(json!([1, 2])));
    }

    #[test]
    fn test_multipart_values_are_stringified() {
        assert_eq!(stringify(&Value::Null), "null");
        assert_eq!(stringify(&json!("text")), "text");
        assert_eq!(stringify(&json!({"id": 1})), r#"{"id":1}"#);
        assert_eq!(stringify(&json!(3)), "3");
    }

    #[test]
    fn test_upstream_error_rendering() {
        let dev = RequestForwarder::new(reqwest::Client::new(), false);
        let prod = RequestForwarder::new(reqwest::Client::new(), true);

        let structured = br#"{"errors":[{"status":403,"detail":"Forbidden"}]}"#;
        assert_eq!(dev.upstream_error(StatusCode::FORBIDDEN, structured).status(), 403);
        assert_eq!(prod.upstream_error(StatusCode::FORBIDDEN, structured).status(), 403);

        assert_eq!(dev.upstream_error(StatusCode::BAD_REQUEST, b"bad input").status(), 400);
        assert_eq!(
            prod.upstream_error(StatusCode::BAD_REQUEST, b"bad input").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
