// ABOUTME: HTTP control surface: update triggers, metrics and report behind a bearer token.
// ABOUTME: Builds the axum router and serves it until shutdown is requested.

mod auth;
mod handlers;

use crate::app::App;
use crate::runtime::Runtime;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Which endpoint groups are exposed.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub token: String,
    pub update: bool,
    pub metrics: bool,
}

impl ApiConfig {
    pub fn enabled(&self) -> bool {
        self.update || self.metrics
    }
}

pub struct ApiState<R> {
    app: Arc<App<R>>,
    token: auth::TokenDigest,
}

impl<R> Clone for ApiState<R> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
            token: self.token,
        }
    }
}

/// Errors returned to API clients as `{code, error}`.
#[derive(Debug)]
pub enum ApiError {
    MissingToken,
    InvalidToken,
    UpdateRunning,
    NoReport,
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingToken => "MISSING_TOKEN",
            ApiError::InvalidToken => "INVALID_TOKEN",
            ApiError::UpdateRunning => "UPDATE_RUNNING",
            ApiError::NoReport => "NOT_FOUND",
            ApiError::Internal(_) => "API_INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingToken | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::UpdateRunning => StatusCode::CONFLICT,
            ApiError::NoReport => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::MissingToken => "No authentication token was supplied".to_string(),
            ApiError::InvalidToken => {
                "The supplied token does not match the configured auth token".to_string()
            }
            ApiError::UpdateRunning => "Update already running".to_string(),
            ApiError::NoReport => "No session has completed yet".to_string(),
            ApiError::Internal(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "code": self.code(), "error": self.message() }));
        (self.status(), body).into_response()
    }
}

/// Builds the router for the enabled endpoint groups.
pub fn router<R: Runtime + 'static>(app: Arc<App<R>>, config: &ApiConfig) -> Router {
    let state = ApiState {
        app,
        token: auth::digest(&config.token),
    };

    let mut router = Router::new();
    if config.update {
        router = router
            .route("/v1/update", post(handlers::update_v1::<R>))
            .route("/v2/updates/apply", post(handlers::apply_v2::<R>))
            .route("/v2/updates/check", post(handlers::check_v2::<R>))
            .route("/v1/report", get(handlers::report::<R>));
    }
    if config.metrics {
        router = router.route("/v1/metrics", get(handlers::metrics::<R>));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token::<R>,
        ))
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
