//! Request handling and transformation.
//!
//! # Responsibilities
//! - Resolve the request ID (set by the request-id layer, generated otherwise)
//! - Prepare the request for forwarding to a backend
//!
//! # Design Decisions
//! - The request ID is also the inspection transaction id
//! - Original request head is kept for the response path; a copy is forwarded

use std::net::SocketAddr;
use std::str::FromStr;

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{request, HeaderMap, HeaderValue, Request, Uri};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID from the headers, or a fresh UUID v4.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Copy of the downstream request addressed to `backend`.
pub fn upstream_request(
    head: &request::Parts,
    backend: SocketAddr,
    request_id: &str,
    body: Body,
) -> Result<Request<Body>, axum::http::Error> {
    let mut builder = Request::builder().method(head.method.clone());

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in head.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(X_REQUEST_ID, value);
        }
    }

    // URI rewrite
    let mut uri_parts = head.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Authority::from_str(&backend.to_string()).ok();
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(axum::http::uri::PathAndQuery::from_static("/"));
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| head.uri.clone());

    builder.uri(uri).body(body)
}
