use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{Html, IntoResponse, Response},
};

use crate::application::{error::HttpError, pages::PageContent};

use super::{AppState, respond_with};

const SOURCE: &str = "infra::http::pages";

/// Proxy any unrouted GET or HEAD to the upstream origin.
pub(super) async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, HttpError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{method} is not supported on proxied paths"),
        ));
    }

    let pages = state
        .pages
        .as_ref()
        .ok_or_else(|| HttpError::not_configured(SOURCE, "upstream"))?;
    let lookup = pages.render(uri.path(), uri.query()).await?;
    Ok(respond_with(lookup, render))
}

fn render(content: PageContent) -> Response {
    match content {
        PageContent::Html(html) => Html(html).into_response(),
        PageContent::Passthrough {
            status,
            content_type,
            headers,
            body,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = (status, Body::from(body)).into_response();
            let relayed = response.headers_mut();
            for (name, value) in headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    relayed.append(name, value);
                }
            }
            if let Some(value) = content_type.and_then(|value| HeaderValue::from_str(&value).ok())
            {
                relayed.insert(CONTENT_TYPE, value);
            }
            response
        }
    }
}
