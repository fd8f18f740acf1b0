//! Per-request context and request logging.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use quillbin_core::Error;

use crate::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// What handlers need to know about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Key for the rate limiter
    pub client: String,
    /// Raw Authorization header, if one was sent. Only mutations read it.
    pub authorization: Option<String>,
    pub path: String,
    pub request_id: String,
}

impl RequestContext {
    /// Render a core error with this request's path and ID. Storage
    /// failures are logged here, where the request is known.
    pub fn error(&self, err: Error) -> ApiError {
        if err.is_storage() {
            log::error!("{} failed [{}]: {err}", self.path, self.request_id);
        }
        ApiError::from(err).with_context(&self.path, &self.request_id)
    }

    /// The bearer token, if any. A header in any other form is `Invalid`.
    pub fn bearer_token(&self) -> Result<Option<&str>, Error> {
        let Some(raw) = self.authorization.as_deref() else {
            return Ok(None);
        };
        raw.strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Some)
            .ok_or_else(|| Error::invalid("malformed authorization header"))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let request_id = header_str(&parts.headers, REQUEST_ID_HEADER)
            .unwrap_or_default()
            .to_string();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let client = client_key(&parts.headers, peer);

        // Non-ASCII values are kept as empty so they still fail as malformed.
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap_or_default().to_string());

        Ok(Self {
            client,
            authorization,
            path,
            request_id,
        })
    }
}

/// First `X-Forwarded-For` entry, else `X-Real-IP`, else the peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<String>) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Log method, path, status and latency. Heartbeats are not logged.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if path == "/ping" {
        return next.run(req).await;
    }

    let request_id = header_str(req.headers(), REQUEST_ID_HEADER)
        .unwrap_or("-")
        .to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    let status = response.status();
    let elapsed = started.elapsed();

    if status.is_server_error() {
        log::error!("{method} {path} {} {elapsed:?} [{request_id}]", status.as_u16());
    } else {
        log::info!("{method} {path} {} {elapsed:?} [{request_id}]", status.as_u16());
    }
    response
}
