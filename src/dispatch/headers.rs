//! Header allow-lists.
//!
//! Nothing crosses the gateway unless listed here; matching is
//! case-insensitive because `HeaderName` is always lowercase.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Caller headers copied onto the outbound request.
const REQUEST_HEADERS: &[&str] = &["cache-control", "charset", "location"];

/// Upstream headers copied back to the caller.
const RESPONSE_HEADERS: &[&str] = &[
    "cache-control",
    "charset",
    "location",
    "content-disposition",
    "content-type",
    "content-encoding",
    "surrogate-key",
    "app_key",
    "cache",
    "uncache",
];

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Outbound headers for a forwarded request.
///
/// The caller's `Host` travels as `x-forwarded-host`; the outbound `Host`
/// is the backend's.
pub fn outbound_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in REQUEST_HEADERS {
        for value in inbound.get_all(*name) {
            out.append(HeaderName::from_static(*name), value.clone());
        }
    }
    if let Some(host) = inbound.get(header::HOST) {
        out.insert(HeaderName::from_static(X_FORWARDED_HOST), host.clone());
    }
    out
}

pub fn is_allowed_response_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("access-control-") || RESPONSE_HEADERS.contains(&name)
}

/// Copy allow-listed upstream headers into `out`.
pub fn copy_response_headers(upstream: &HeaderMap, out: &mut HeaderMap) {
    for (name, value) in upstream {
        if is_allowed_response_header(name) {
            out.append(name.clone(), value.clone());
        }
    }
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v: &HeaderValue| v.to_str().ok())
}
