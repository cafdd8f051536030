pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::application::publish::PublishService;
use crate::infra::http::RouterState;
use crate::infra::http::middleware::{log_responses, set_request_context};

pub use middleware::OwnerId;

#[derive(Clone)]
pub struct ApiState {
    pub publish: Arc<PublishService>,
}

pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route("/api/v1/publish", post(handlers::publish_page))
        .route(
            "/api/v1/pages/{slug}/versions",
            get(handlers::list_versions),
        )
        .route(
            "/api/v1/pages/{slug}/versions/{version_label}",
            delete(handlers::delete_version),
        )
        .route("/api/v1/pages/{slug}/rollback", post(handlers::rollback_page))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::require_owner))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
