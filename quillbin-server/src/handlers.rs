//! HTTP handlers. Each one extracts request data, runs a single
//! `DocumentService` call on a blocking thread and renders the result.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use quillbin_core::{
    parse_version, Document, DocumentService, Error, Permission, StoreError, LATEST_VERSION,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::labels;
use crate::middleware::RequestContext;
use crate::routes::AppState;

type ApiResult<T> = Result<T, ApiError>;

// ─── Bodies ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub version: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl DocumentResponse {
    fn new(document: Document) -> Self {
        Self {
            key: document.id,
            version: document.version,
            data: document.content,
            language: document.language,
            ..Self::default()
        }
    }

    fn labelled(mut self) -> Self {
        self.version_label = labels::version_label(self.version, labels::now());
        self.version_time = labels::version_time(self.version);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub versions: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionsQuery {
    #[serde(rename = "withData", default)]
    pub with_data: bool,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Run a service call off the async runtime.
async fn run<T, F>(service: &Arc<DocumentService>, f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce(&DocumentService) -> Result<T, Error> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| Error::Storage(StoreError::Database(format!("blocking task failed: {e}"))))?
}

fn language_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("language")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Buffered request body. Failing to buffer it, usually because it is over
/// the configured size limit, renders as the JSON error body.
fn body_bytes(ctx: &RequestContext, body: Result<Bytes, BytesRejection>) -> ApiResult<Bytes> {
    body.map_err(|rejection| {
        ApiError::new(rejection.status(), rejection.body_text()).with_context(&ctx.path, &ctx.request_id)
    })
}

fn body_text(ctx: &RequestContext, body: Result<Bytes, BytesRejection>) -> ApiResult<String> {
    let body = body_bytes(ctx, body)?;
    String::from_utf8(body.to_vec())
        .map_err(|_| ctx.error(Error::invalid("request body is not valid UTF-8")))
}

/// Only mutations look at the Authorization header, so reads ignore any
/// scheme other than Bearer.
fn bearer_token(ctx: &RequestContext) -> ApiResult<Option<String>> {
    ctx.bearer_token()
        .map(|token| token.map(str::to_string))
        .map_err(|e| ctx.error(e))
}

fn version_param(ctx: &RequestContext, raw: &str) -> ApiResult<i64> {
    parse_version(raw).map_err(|e| ctx.error(e))
}

fn parse_share_request(body: &[u8]) -> Result<Vec<Permission>, Error> {
    let request: ShareRequest =
        serde_json::from_slice(body).map_err(|e| Error::invalid(format!("invalid request body: {e}")))?;
    if request.permissions.is_empty() {
        return Err(Error::invalid("no permissions provided"));
    }
    request.permissions.iter().map(|p| p.parse()).collect()
}

// ─── Meta ────────────────────────────────────────────────────────────────────

pub async fn ping() -> &'static str {
    "."
}

pub async fn version() -> String {
    crate::build_version()
}

// ─── Reads ───────────────────────────────────────────────────────────────────

async fn fetch(state: &AppState, ctx: &RequestContext, id: String, version: i64) -> ApiResult<Document> {
    run(&state.service, move |svc| svc.get(&id, version))
        .await
        .map_err(|e| ctx.error(e))
}

pub async fn get_raw(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let document = fetch(&state, &ctx, id, LATEST_VERSION).await?;
    Ok(raw_response(document))
}

pub async fn get_raw_version(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    let version = version_param(&ctx, &version)?;
    let document = fetch(&state, &ctx, id, version).await?;
    Ok(raw_response(document))
}

fn raw_response(document: Document) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        document.content,
    )
        .into_response()
}

pub async fn get_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentResponse>> {
    let document = fetch(&state, &ctx, id, LATEST_VERSION).await?;
    Ok(Json(DocumentResponse::new(document)))
}

pub async fn get_document_version(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<DocumentResponse>> {
    let version = version_param(&ctx, &version)?;
    let document = fetch(&state, &ctx, id, version).await?;
    Ok(Json(DocumentResponse::new(document)))
}

pub async fn list_versions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Query(query): Query<VersionsQuery>,
) -> ApiResult<Json<Vec<DocumentResponse>>> {
    let versions = run(&state.service, move |svc| svc.list_versions(&id, query.with_data))
        .await
        .map_err(|e| ctx.error(e))?;

    let now = labels::now();
    let response = versions
        .into_iter()
        .map(|doc| DocumentResponse {
            key: String::new(),
            version_label: labels::version_label(doc.version, now),
            version_time: labels::version_time(doc.version),
            ..DocumentResponse::new(doc)
        })
        .collect();
    Ok(Json(response))
}

// ─── Mutations ───────────────────────────────────────────────────────────────

pub async fn create_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<DocumentResponse>> {
    let content = body_text(&ctx, body)?;
    let language = language_header(&headers);
    let client = ctx.client.clone();

    let created = run(&state.service, move |svc| {
        svc.create(&client, &content, language.as_deref())
    })
    .await
    .map_err(|e| ctx.error(e))?;

    log::info!("Created document {} [{}]", created.document.id, ctx.request_id);
    Ok(Json(DocumentResponse {
        token: created.token,
        ..DocumentResponse::new(created.document).labelled()
    }))
}

pub async fn update_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<DocumentResponse>> {
    let content = body_text(&ctx, body)?;
    let language = language_header(&headers);
    let token = bearer_token(&ctx)?;
    let client = ctx.client.clone();

    let document = run(&state.service, move |svc| {
        let claims = svc.verify_token(token.as_deref())?;
        svc.update(&client, &claims, &id, &content, language.as_deref())
    })
    .await
    .map_err(|e| ctx.error(e))?;

    Ok(Json(DocumentResponse::new(document).labelled()))
}

pub async fn delete_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    delete(&state, &ctx, id, LATEST_VERSION).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_document_version(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    let version = version_param(&ctx, &version)?;
    let remaining = delete(&state, &ctx, id, version).await?;
    if version == LATEST_VERSION {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(DeleteResponse { versions: remaining }).into_response())
}

async fn delete(state: &AppState, ctx: &RequestContext, id: String, version: i64) -> ApiResult<usize> {
    let token = bearer_token(ctx)?;
    let client = ctx.client.clone();
    run(&state.service, move |svc| {
        let claims = svc.verify_token(token.as_deref())?;
        svc.delete(&client, &claims, &id, version)
    })
    .await
    .map_err(|e| ctx.error(e))
}

pub async fn share_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<ShareResponse>> {
    let body = body_bytes(&ctx, body)?;
    let requested = parse_share_request(&body).map_err(|e| ctx.error(e))?;
    let token = bearer_token(&ctx)?;
    let client = ctx.client.clone();

    let token = run(&state.service, move |svc| {
        let claims = svc.verify_token(token.as_deref())?;
        svc.share(&client, &claims, &id, &requested)
    })
    .await
    .map_err(|e| ctx.error(e))?;

    Ok(Json(ShareResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_request_parsing() {
        assert_eq!(
            parse_share_request(br#"{"permissions":["write","share"]}"#).unwrap(),
            vec![Permission::Write, Permission::Share]
        );
        assert!(matches!(parse_share_request(b"not json"), Err(Error::Invalid(_))));
        assert!(matches!(
            parse_share_request(br#"{"permissions":[]}"#),
            Err(Error::Invalid(m)) if m == "no permissions provided"
        ));
        assert!(matches!(
            parse_share_request(br#"{"permissions":["admin"]}"#),
            Err(Error::Invalid(m)) if m.contains("admin")
        ));
    }

    #[test]
    fn test_document_response_omits_empty_fields() {
        let body = serde_json::to_value(DocumentResponse {
            version: 5,
            language: "plaintext".into(),
            ..DocumentResponse::default()
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"version": 5, "language": "plaintext"}));
    }
}
