//! Articles mirrored from the relational store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Untrusted create/update body as received over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArticleInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
}

/// Validated article fields ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub published: Option<bool>,
}

impl TryFrom<ArticleInput> for ArticleDraft {
    type Error = DomainError;

    fn try_from(input: ArticleInput) -> Result<Self, Self::Error> {
        let title = required(input.title, "title")?;
        let content = required(input.content, "content")?;
        Ok(Self {
            title,
            content,
            published: input.published,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DomainError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DomainError::validation(format!("`{field}` is required"))),
    }
}
