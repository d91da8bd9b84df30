//! Inbound request parsing.
//!
//! # Responsibilities
//! - Split the query, consuming `app_key`
//! - Buffer and decode the body (JSON, url-encoded form, multipart, raw)
//! - Spool uploaded files into temporary files owned by the request
//!
//! # Design Decisions
//! - Temporary files live exactly as long as the `InboundRequest`; dropping
//!   it (after dispatch, on error, or on client disconnect) deletes them

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request},
};
use bytes::Bytes;
use futures_util::stream;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::dispatch::headers::header_str;
use crate::dispatch::GatewayError;

pub const APP_KEY: &str = "app_key";

/// Decoded request body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InboundBody {
    #[default]
    Empty,
    Json(Value),
    /// Url-encoded or multipart text fields.
    Form(Map<String, Value>),
    /// Anything else, forwarded untouched.
    Raw { content_type: Option<String>, bytes: Bytes },
}

/// A file uploaded in a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub file: NamedTempFile,
}

/// A caller request, decoded for forwarding.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    /// Query pairs in order, without `app_key`.
    pub query: Vec<(String, String)>,
    pub app_key: Option<String>,
    pub headers: HeaderMap,
    pub body: InboundBody,
    pub files: Vec<UploadedFile>,
}

impl InboundRequest {
    pub async fn from_request(
        request: Request<Body>,
        max_body_bytes: usize,
    ) -> Result<Self, GatewayError> {
        let (parts, body) = request.into_parts();

        let (query, query_app_key) = split_query(parts.uri.query());
        let app_key = query_app_key.or_else(|| {
            header_str(&parts.headers, APP_KEY).map(str::to_string)
        });

        let bytes = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|e| GatewayError::BadRequest(format!("unreadable body: {e}")))?;

        let content_type = header_str(&parts.headers, header::CONTENT_TYPE.as_str())
            .map(str::to_string);
        let (body, files) = decode_body(content_type, bytes).await?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query,
            app_key,
            headers: parts.headers,
            body,
            files,
        })
    }
}

/// Query pairs without `app_key`, and the `app_key` itself.
pub fn split_query(query: Option<&str>) -> (Vec<(String, String)>, Option<String>) {
    let mut app_key = None;
    let pairs = form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter_map(|(k, v)| {
            if k == APP_KEY {
                app_key = Some(v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();
    (pairs, app_key)
}

async fn decode_body(
    content_type: Option<String>,
    bytes: Bytes,
) -> Result<(InboundBody, Vec<UploadedFile>), GatewayError> {
    if bytes.is_empty() {
        return Ok((InboundBody::Empty, Vec::new()));
    }

    let mime = content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "application/json" => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {e}")))?;
            Ok((InboundBody::Json(value), Vec::new()))
        }
        "application/x-www-form-urlencoded" => {
            let fields = form_urlencoded::parse(&bytes)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            Ok((InboundBody::Form(fields), Vec::new()))
        }
        "multipart/form-data" => {
            let content_type = content_type.unwrap_or_default();
            decode_multipart(&content_type, bytes).await
        }
        _ => Ok((
            InboundBody::Raw {
                content_type,
                bytes,
            },
            Vec::new(),
        )),
    }
}

async fn decode_multipart(
    content_type: &str,
    bytes: Bytes,
) -> Result<(InboundBody, Vec<UploadedFile>), GatewayError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| GatewayError::BadRequest(format!("invalid multipart body: {e}")))?;
    let body = stream::once(async move { Ok::<Bytes, std::io::Error>(bytes) });
    let mut multipart = multer::Multipart::new(body, boundary);

    let mut fields = Map::new();
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(|m| m.to_string());
                let file = NamedTempFile::new()
                    .map_err(|e| GatewayError::Internal(format!("temp file: {e}")))?;
                let handle = file
                    .reopen()
                    .map_err(|e| GatewayError::Internal(format!("temp file: {e}")))?;
                let mut writer = tokio::fs::File::from_std(handle);
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    writer
                        .write_all(&chunk)
                        .await
                        .map_err(|e| GatewayError::Internal(format!("temp file: {e}")))?;
                }
                writer
                    .flush()
                    .await
                    .map_err(|e| GatewayError::Internal(format!("temp file: {e}")))?;

                tracing::debug!(field = %name, file_name = %file_name, "Spooled upload");
                files.push(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    file,
                });
            }
            None => {
                let text = field.text().await.map_err(multipart_error)?;
                fields.insert(name, Value::String(text));
            }
        }
    }

    Ok((InboundBody::Form(fields), files))
}

fn multipart_error(e: multer::Error) -> GatewayError {
    GatewayError::BadRequest(format!("invalid multipart body: {e}"))
}
