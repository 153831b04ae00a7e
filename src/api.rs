use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

use crate::registry::{RegistryError, RegistryService};
use crate::retry::with_storage_retry;
use crate::store::CredentialRecord;

/// Principal recorded for keys created over HTTP without a `created_by`.
pub const HTTP_PRINCIPAL: &str = "http";

#[derive(Clone)]
pub struct ApiState {
    registry: Arc<RegistryService>,
    admin_token: Option<Arc<str>>,
    loader_token: Option<Arc<str>>,
}

impl ApiState {
    /// `admin_token` of `None` (or empty) means no HTTP caller is privileged.
    pub fn new(registry: Arc<RegistryService>, admin_token: Option<String>) -> Self {
        let admin_token = admin_token.filter(|t| !t.is_empty()).map(Arc::from);
        Self {
            registry,
            admin_token,
            loader_token: None,
        }
    }

    /// Accept `loader_token` for the id list only. Empty means none.
    pub fn with_loader_token(mut self, loader_token: Option<String>) -> Self {
        self.loader_token = loader_token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }

    /// Privileged means the request carries the admin bearer token.
    fn is_privileged(&self, headers: &HeaderMap) -> bool {
        token_matches(self.admin_token.as_deref(), headers)
    }

    /// The id list is open to the admin and the loader.
    fn may_list_ids(&self, headers: &HeaderMap) -> bool {
        self.is_privileged(headers) || token_matches(self.loader_token.as_deref(), headers)
    }

    /// Run a registry call on the blocking pool, retrying storage failures.
    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: Fn(&RegistryService) -> Result<T, RegistryError> + Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || with_storage_retry(operation, || f(&*registry)))
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "Registry task failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            })?
            .map_err(ApiError::from)
    }
}

fn token_matches(expected: Option<&str>, headers: &HeaderMap) -> bool {
    match (expected, bearer_token(headers)) {
        (Some(expected), Some(given)) => expected.as_bytes().ct_eq(given.as_bytes()).into(),
        _ => false,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    duration: String,
    #[serde(default)]
    created_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    id: String,
    valid: bool,
    expires_at: u64,
    used: bool,
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    id: String,
    used: bool,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    removed: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::InvalidDuration { .. } => StatusCode::BAD_REQUEST,
            RegistryError::PermissionDenied => StatusCode::FORBIDDEN,
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/keys", get(handle_list_ids).post(handle_create).delete(handle_clear))
        .route("/keys/details", get(handle_list_details))
        .route("/keys/:id", get(handle_check).delete(handle_delete))
        .route("/keys/:id/used", post(handle_toggle_used))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    let socket_addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid listen address {addr}"))?;
    tokio::net::TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
}

pub async fn serve<S>(listener: tokio::net::TcpListener, state: ApiState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Active key ids only: the list an external loader validates against.
async fn handle_list_ids(State(state): State<ApiState>, headers: HeaderMap) -> Result<Json<Vec<String>>, ApiError> {
    let privileged = state.may_list_ids(&headers);
    let records = state.call("list", move |r| r.list(privileged)).await?;
    Ok(Json(records.into_iter().map(|r| r.id().to_string()).collect()))
}

async fn handle_list_details(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CredentialRecord>>, ApiError> {
    let privileged = state.is_privileged(&headers);
    let records = state.call("list", move |r| r.list(privileged)).await?;
    Ok(Json(records))
}

async fn handle_check(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<CheckResponse>, ApiError> {
    let record = state.call("check", move |r| r.get(&id)).await?;
    Ok(Json(CheckResponse {
        id: record.id().to_string(),
        valid: true,
        expires_at: record.expires_at(),
        used: record.used(),
    }))
}

async fn handle_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<CreateRequest>,
) -> Result<(StatusCode, Json<CredentialRecord>), ApiError> {
    let privileged = state.is_privileged(&headers);
    let created_by = req
        .created_by
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| HTTP_PRINCIPAL.to_string());
    let record = state
        .call("create", move |r| r.create(&req.duration, &created_by, privileged))
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn handle_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    let privileged = state.is_privileged(&headers);
    state.call("delete", move |r| r.delete(&id, privileged)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_toggle_used(
    State(state): State<ApiState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let privileged = state.is_privileged(&headers);
    let normalized = crate::registry::id::normalize(&id);
    let used = state.call("toggle", move |r| r.toggle_used(&id, privileged)).await?;
    Ok(Json(ToggleResponse { id: normalized, used }))
}

async fn handle_clear(State(state): State<ApiState>, headers: HeaderMap) -> Result<Json<ClearResponse>, ApiError> {
    let privileged = state.is_privileged(&headers);
    let removed = state.call("clear", move |r| r.clear_all(privileged)).await?;
    Ok(Json(ClearResponse { removed }))
}
