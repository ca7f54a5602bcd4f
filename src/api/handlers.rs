// ABOUTME: HTTP handlers for update triggers, metrics and the last session report.
// ABOUTME: v1 skips or queues when busy; v2 answers 409 while another update runs.

use super::{ApiError, ApiState};
use crate::app::RunOptions;
use crate::runtime::Runtime;
use crate::session::Trigger;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde_json::json;

type QueryPairs = Query<Vec<(String, String)>>;

/// `image` parameters, each possibly a comma-separated list.
pub(super) fn parse_images(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(key, _)| key == "image")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|image| !image.is_empty())
        .map(String::from)
        .collect()
}

pub async fn update_v1<R: Runtime + 'static>(
    State(state): State<ApiState<R>>,
    Query(pairs): QueryPairs,
) -> Result<Response, ApiError> {
    tracing::info!("Updates triggered by HTTP API request");
    let images = parse_images(&pairs);
    let options = RunOptions {
        images,
        monitor_only: false,
    };

    let result = if options.images.is_empty() {
        match state.app.try_run(Trigger::Api, options).await {
            Some(result) => result,
            None => {
                tracing::debug!("Skipped, another update is already running");
                return Ok(Json(json!({ "skipped": true })).into_response());
            }
        }
    } else {
        state.app.run_queued(Trigger::Api, options).await
    };

    result.map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "skipped": false })).into_response())
}

async fn update_v2<R: Runtime + 'static>(
    state: ApiState<R>,
    pairs: Vec<(String, String)>,
    monitor_only: bool,
) -> Result<Response, ApiError> {
    tracing::info!(monitor_only, "Updates triggered by HTTP API request");
    let options = RunOptions {
        images: parse_images(&pairs),
        monitor_only,
    };
    let report = state
        .app
        .try_run(Trigger::Api, options)
        .await
        .ok_or(ApiError::UpdateRunning)?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(report.as_ref()).into_response())
}

pub async fn apply_v2<R: Runtime + 'static>(
    State(state): State<ApiState<R>>,
    Query(pairs): QueryPairs,
) -> Result<Response, ApiError> {
    update_v2(state, pairs, false).await
}

pub async fn check_v2<R: Runtime + 'static>(
    State(state): State<ApiState<R>>,
    Query(pairs): QueryPairs,
) -> Result<Response, ApiError> {
    update_v2(state, pairs, true).await
}

pub async fn metrics<R: Runtime + 'static>(State(state): State<ApiState<R>>) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.app.metrics().render(),
    )
        .into_response()
}

pub async fn report<R: Runtime + 'static>(
    State(state): State<ApiState<R>>,
) -> Result<Response, ApiError> {
    let report = state.app.last_report().ok_or(ApiError::NoReport)?;
    Ok(Json(report.as_ref()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn images_are_split_and_repeated() {
        let images = parse_images(&pairs(&[
            ("image", "nginx,redis"),
            ("other", "x"),
            ("image", "postgres"),
            ("image", ""),
        ]));
        assert_eq!(images, vec!["nginx", "redis", "postgres"]);
    }
}
