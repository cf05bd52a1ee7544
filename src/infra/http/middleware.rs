//! Request correlation and per-response logging.
//!
//! Every response carries an `x-request-id`; callers may supply their own,
//! which is reused when it is a reasonable token. The response log records
//! how the cache took part in the request.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::cache::SERVED_VIA_CACHE_HEADER;

use super::CACHE_INVALIDATION_HEADER;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const LOG_TARGET: &str = "readthrough::http::response";
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id =
        inbound_request_id(request.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let acceptable = !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    acceptable.then(|| value.to_string())
}

/// How the cache took part in producing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheOutcome {
    Hit,
    UpkeepFailed,
    Bypassed,
}

impl CacheOutcome {
    fn of(headers: &HeaderMap) -> Self {
        if headers
            .get(CACHE_INVALIDATION_HEADER)
            .is_some_and(|value| value == "failed")
        {
            Self::UpkeepFailed
        } else if headers.contains_key(SERVED_VIA_CACHE_HEADER) {
            Self::Hit
        } else {
            Self::Bypassed
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::UpkeepFailed => "upkeep_failed",
            Self::Bypassed => "none",
        }
    }
}

struct Exchange {
    method: Method,
    uri: Uri,
    request_id: String,
    started: Instant,
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let exchange = Exchange {
        method: request.method().clone(),
        uri: request.uri().clone(),
        request_id: request
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.request_id.clone())
            .unwrap_or_default(),
        started: Instant::now(),
    };

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        log_failure(&exchange, status, report);
    } else {
        log_success(&exchange, status, CacheOutcome::of(response.headers()));
    }

    response
}

fn log_success(exchange: &Exchange, status: StatusCode, cache: CacheOutcome) {
    let elapsed_ms = exchange.started.elapsed().as_millis();
    if cache == CacheOutcome::UpkeepFailed {
        warn!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %exchange.method,
            path = %exchange.uri.path(),
            elapsed_ms,
            cache = cache.as_str(),
            request_id = %exchange.request_id,
            "mutation committed but cached entries may be stale",
        );
    } else {
        debug!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %exchange.method,
            path = %exchange.uri.path(),
            elapsed_ms,
            cache = cache.as_str(),
            request_id = %exchange.request_id,
            "request served",
        );
    }
}

fn log_failure(exchange: &Exchange, status: StatusCode, report: Option<ErrorReport>) {
    let elapsed_ms = exchange.started.elapsed().as_millis();
    let (source, messages) = report
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");

    if status.is_server_error() {
        error!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %exchange.method,
            path = %exchange.uri.path(),
            query = exchange.uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = %exchange.request_id,
            "request failed",
        );
    } else {
        warn!(
            target: LOG_TARGET,
            status = status.as_u16(),
            method = %exchange.method,
            path = %exchange.uri.path(),
            query = exchange.uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail,
            request_id = %exchange.request_id,
            "client request error",
        );
    }
}
