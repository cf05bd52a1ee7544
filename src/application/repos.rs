//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::articles::{ArticleDraft, ArticleRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    /// All articles, newest first.
    async fn list_articles(&self) -> Result<Vec<ArticleRecord>, RepoError>;

    async fn find_article(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError>;

    async fn create_article(&self, draft: &ArticleDraft) -> Result<ArticleRecord, RepoError>;

    /// `None` when no row has `id`.
    async fn update_article(
        &self,
        id: i64,
        draft: &ArticleDraft,
    ) -> Result<Option<ArticleRecord>, RepoError>;

    /// `false` when no row has `id`.
    async fn delete_article(&self, id: i64) -> Result<bool, RepoError>;
}
