//! Route table and middleware stack.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use quillbin_core::DocumentService;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::middleware::{log_requests, REQUEST_ID_HEADER};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DocumentService>,
}

impl AppState {
    pub fn new(service: Arc<DocumentService>) -> Self {
        Self { service }
    }
}

/// Build the application router. `body_limit` caps request bodies in
/// bytes; `None` lifts the cap entirely.
pub fn router(state: AppState, request_timeout: Duration, body_limit: Option<usize>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let body_limit = match body_limit {
        Some(bytes) => DefaultBodyLimit::max(bytes),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/version", get(handlers::version))
        .route("/raw/:id", get(handlers::get_raw))
        .route("/raw/:id/versions/:version", get(handlers::get_raw_version))
        .route("/documents", post(handlers::create_document))
        .route(
            "/documents/:id",
            get(handlers::get_document)
                .patch(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route("/documents/:id/share", post(handlers::share_document))
        .route("/documents/:id/versions", get(handlers::list_versions))
        .route(
            "/documents/:id/versions/:version",
            get(handlers::get_document_version).delete(handlers::delete_document_version),
        )
        .layer(body_limit)
        .layer(axum::middleware::from_fn(log_requests))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}
