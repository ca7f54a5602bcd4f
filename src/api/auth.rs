// ABOUTME: Bearer-token middleware guarding every HTTP endpoint.
// ABOUTME: Missing and mismatched tokens are told apart in the 401 body.

use super::{ApiError, ApiState};
use crate::runtime::Runtime;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

/// SHA-256 of a bearer token.
pub(super) type TokenDigest = [u8; 32];

pub(super) fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

/// Compares digests without short-circuiting, so timing does not reveal
/// how much of the token matched.
fn token_matches(expected: &TokenDigest, supplied: &str) -> bool {
    let supplied = digest(supplied);
    expected
        .iter()
        .zip(supplied.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

pub async fn require_token<R: Runtime + 'static>(
    State(state): State<ApiState<R>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    match header {
        None | Some("") => Err(ApiError::MissingToken),
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if token_matches(&state.token, token) => Ok(next.run(request).await),
            _ => Err(ApiError::InvalidToken),
        },
    }
}
