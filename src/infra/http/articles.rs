use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::application::{
    articles::{ArticleService, Mutation},
    error::HttpError,
};
use crate::domain::articles::ArticleInput;

use super::{AppState, CACHE_INVALIDATION_HEADER, respond_with};

const SOURCE: &str = "infra::http::articles";

fn service(state: &AppState) -> Result<&Arc<ArticleService>, HttpError> {
    state
        .articles
        .as_ref()
        .ok_or_else(|| HttpError::not_configured(SOURCE, "database"))
}

fn payload(body: Result<Json<ArticleInput>, JsonRejection>) -> Result<ArticleInput, HttpError> {
    body.map(|Json(input)| input).map_err(|rejection| {
        HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid JSON body",
            rejection.body_text(),
        )
    })
}

/// Flag a committed mutation whose cache upkeep failed.
fn with_cache_status<T>(mutation: &Mutation<T>, mut response: Response) -> Response {
    if !mutation.cache_consistent() {
        response
            .headers_mut()
            .insert(CACHE_INVALIDATION_HEADER, HeaderValue::from_static("failed"));
    }
    response
}

pub(super) async fn list(State(state): State<AppState>) -> Result<Response, HttpError> {
    let lookup = service(&state)?.list().await?;
    Ok(respond_with(lookup, |articles| Json(articles).into_response()))
}

pub(super) async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, HttpError> {
    let lookup = service(&state)?.get(id).await?;
    Ok(respond_with(lookup, |article| Json(article).into_response()))
}

pub(super) async fn create(
    State(state): State<AppState>,
    body: Result<Json<ArticleInput>, JsonRejection>,
) -> Result<Response, HttpError> {
    let service = service(&state)?;
    let mutation = service.create(payload(body)?).await?;
    let response = (StatusCode::CREATED, Json(&mutation.value)).into_response();
    Ok(with_cache_status(&mutation, response))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<ArticleInput>, JsonRejection>,
) -> Result<Response, HttpError> {
    let service = service(&state)?;
    let mutation = service.update(id, payload(body)?).await?;
    let response = Json(&mutation.value).into_response();
    Ok(with_cache_status(&mutation, response))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, HttpError> {
    let mutation = service(&state)?.delete(id).await?;
    Ok(with_cache_status(
        &mutation,
        StatusCode::NO_CONTENT.into_response(),
    ))
}
