use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;

/// Header carrying the caller's identity, set by the upstream auth gateway.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Authenticated owner of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

pub async fn require_owner(mut request: Request<Body>, next: Next) -> Response {
    let owner = request
        .headers()
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| OwnerId(value.to_string()));

    let Some(owner) = owner else {
        return ApiError::unauthorized().into_response();
    };

    request.extensions_mut().insert(owner.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(owner);
    response
}
