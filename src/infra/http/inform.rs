//! Webhook receiving change notifications from the database.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::application::{error::HttpError, inform::InformPayload};
use crate::cache::{ChangeOperation, Invalidator, KeySpace};

use super::AppState;

pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

const SOURCE: &str = "infra::http::inform";

pub struct WebhookState {
    token: Option<String>,
    invalidator: Arc<Invalidator>,
    keys: KeySpace,
}

impl WebhookState {
    pub fn new(token: Option<String>, invalidator: Arc<Invalidator>, keys: KeySpace) -> Self {
        Self {
            token,
            invalidator,
            keys,
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), HttpError> {
        let Some(expected) = self.token.as_deref() else {
            return Err(HttpError::not_configured(SOURCE, "webhook token"));
        };

        let provided = headers
            .get(WEBHOOK_TOKEN_HEADER)
            .map(|value| value.as_bytes())
            .unwrap_or_default();
        if bool::from(provided.ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(HttpError::new(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "webhook token missing or mismatched",
            ))
        }
    }
}

#[derive(Debug, Serialize)]
struct InformResponse {
    operation: &'static str,
    invalidated: Vec<String>,
}

fn operation_name(operation: ChangeOperation) -> &'static str {
    match operation {
        ChangeOperation::Insert => "insert",
        ChangeOperation::Update => "update",
        ChangeOperation::Delete => "delete",
    }
}

pub(super) async fn inform(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let webhook = state.webhook.as_ref();
    webhook.authorize(&headers)?;

    let payload: InformPayload = serde_json::from_slice(&body).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Malformed notification",
            &err,
        )
    })?;
    let change = payload.to_change(&webhook.keys)?;

    webhook
        .invalidator
        .apply_change(&webhook.keys, &change)
        .await
        .map_err(|err| {
            warn!(error = %err, "webhook invalidation failed");
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalidation failed",
                &err,
            )
        })?;

    let operation = operation_name(change.operation());
    let invalidated = change.affected_keys(&webhook.keys);
    info!(
        operation,
        table = payload.table.as_deref().unwrap_or(&webhook.keys.table),
        keys = ?invalidated,
        "applied change notification"
    );

    Ok((
        StatusCode::OK,
        Json(InformResponse {
            operation,
            invalidated,
        }),
    )
        .into_response())
}
