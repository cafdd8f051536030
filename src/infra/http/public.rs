use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderValue, Method, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, HOST},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        artifacts::HTML_CONTENT_TYPE,
        delivery::{DeliveredPage, DeliveryService, DeliverySource},
        error::HttpError,
    },
    infra::db::PostgresRepositories,
};

use super::{
    RouterState, db_health_response,
    middleware::{log_responses, set_request_context},
};

/// Response header naming where a served page came from.
pub const SOURCE_HEADER: &str = "x-pagepress-source";
pub const VERSION_HEADER: &str = "x-pagepress-version";

#[derive(Clone)]
pub struct PublicState {
    pub delivery: Arc<DeliveryService>,
    /// Absent when running on in-memory repositories.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_public_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route("/_health", get(health))
        .route("/_health/db", get(db_health))
        .fallback(serve_published)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn db_health(State(state): State<PublicState>) -> Response {
    match &state.db {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn serve_published(State(state): State<PublicState>, request: Request<Body>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_published";

    if request.method() != Method::GET && request.method() != Method::HEAD {
        return HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{} is not served for published pages", request.method()),
        )
        .into_response();
    }

    let Some(host) = request_host(&request) else {
        return HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Host header required",
            "request carried no host",
        )
        .into_response();
    };

    match state.delivery.serve(&host).await {
        Ok(Some(page)) => page_response(page),
        Ok(None) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Page not found",
            format!("no page published at `{host}`"),
        )
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn request_host(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string))
        .filter(|host| !host.trim().is_empty())
}

fn page_response(page: DeliveredPage) -> Response {
    let (source, version, cache) = match &page.source {
        DeliverySource::Artifact { version_label } => {
            ("artifact", Some(version_label.clone()), "public, max-age=60")
        }
        DeliverySource::OnDemand => ("on-demand", None, "no-cache"),
    };

    let mut response = (StatusCode::OK, page.html).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(cache));
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    if let Some(value) = version.and_then(|label| HeaderValue::from_str(&label).ok()) {
        headers.insert(VERSION_HEADER, value);
    }
    response
}
