use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::response::IntoResponse;

use super::ApiState;
use super::error::ApiError;
use super::middleware::OwnerId;
use super::models::{
    PublishBody, PublishResponse, RollbackBody, VersionListResponse, VersionView,
};

/// -------- Publish --------
pub async fn publish_page(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Json(body): Json<PublishBody>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.publish.publish(body.into_request(owner.0)).await?;
    // The retention sweep keeps running after the response is sent.
    Ok(Json(PublishResponse::from(outcome)))
}

/// -------- Versions --------
pub async fn list_versions(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, versions) = state.publish.list_versions(&owner.0, &slug).await?;
    Ok(Json(VersionListResponse::new(page, versions)))
}

pub async fn rollback_page(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(slug): Path<String>,
    Json(body): Json<RollbackBody>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .publish
        .rollback(&owner.0, &slug, body.version_label.trim())
        .await?;
    Ok(Json(outcome))
}

pub async fn delete_version(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path((slug, version_label)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state
        .publish
        .delete_version(&owner.0, &slug, &version_label)
        .await?;
    Ok(Json(VersionView::new(version, None)))
}
