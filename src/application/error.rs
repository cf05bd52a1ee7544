use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{articles::ArticleError, inform::InformError, pages::PageError},
    config::LoadError,
    infra::{error::InfraError, http::repo_error_to_http},
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// A route whose backing configuration is absent.
    pub fn not_configured(source: &'static str, what: &str) -> Self {
        Self::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Service misconfigured",
            format!("{what} is not configured"),
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ArticleError> for HttpError {
    fn from(error: ArticleError) -> Self {
        const SOURCE: &str = "infra::http::article_error_to_http_error";
        match error {
            ArticleError::Repo(err) => repo_error_to_http(SOURCE, err),
            ArticleError::Validation(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid article",
                &error,
            ),
            ArticleError::NotFound(_) => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Article not found",
                &error,
            ),
        }
    }
}

impl From<InformError> for HttpError {
    fn from(error: InformError) -> Self {
        HttpError::from_error(
            "infra::http::inform_error_to_http_error",
            StatusCode::BAD_REQUEST,
            "Malformed notification",
            &error,
        )
    }
}

impl From<PageError> for HttpError {
    fn from(error: PageError) -> Self {
        const SOURCE: &str = "infra::http::page_error_to_http_error";
        match &error {
            PageError::Upstream(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Upstream unavailable",
                &error,
            ),
            PageError::InvalidSelector { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service misconfigured",
                &error,
            ),
        }
    }
}

/// Top-level failure of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
