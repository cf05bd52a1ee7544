//! HTTP surface: article CRUD, the `/inform` webhook and the page proxy.

mod articles;
mod inform;
mod middleware;
mod pages;

pub use inform::{WEBHOOK_TOKEN_HEADER, WebhookState};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::application::{
    articles::ArticleService,
    error::{ErrorReport, HttpError},
    pages::PageService,
    repos::RepoError,
};
use crate::cache::{Lookup, SERVED_VIA_CACHE_HEADER};
use crate::infra::db::PostgresRepositories;

/// Set on mutation responses whose cache upkeep failed.
pub const CACHE_INVALIDATION_HEADER: &str = "x-cache-invalidation";

#[derive(Clone)]
pub struct AppState {
    pub articles: Option<Arc<ArticleService>>,
    pub pages: Option<Arc<PageService>>,
    pub webhook: Arc<WebhookState>,
    pub db: Option<PostgresRepositories>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route("/_health/db", get(db_health))
        .route("/articles", get(articles::list).post(articles::create))
        .route(
            "/articles/{id}",
            get(articles::show)
                .put(articles::update)
                .delete(articles::remove),
        )
        .route("/inform", post(inform::inform))
        .fallback(pages::proxy)
        .with_state(state)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn db_health(State(state): State<AppState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_message(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                "database is not configured",
            )
            .attach(&mut response);
            response
        }
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}

/// Render `lookup`, tagging the response when it was served from the cache.
fn respond_with<T>(lookup: Lookup<T>, render: impl FnOnce(T) -> Response) -> Response {
    let hit = lookup.is_hit();
    let mut response = render(lookup.value);
    if hit {
        response
            .headers_mut()
            .insert(SERVED_VIA_CACHE_HEADER, HeaderValue::from_static("true"));
    }
    response
}
