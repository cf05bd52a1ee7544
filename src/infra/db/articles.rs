use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{ArticlesRepo, RepoError},
    domain::articles::{ArticleDraft, ArticleRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const COLUMNS: &str = "id, title, content, published, created_at";

/// SQL for a configurable articles table, rendered once.
pub(super) struct ArticleQueries {
    /// Selects nothing; fails unless the table exists with every expected column.
    pub(super) shape: String,
    list: String,
    find: String,
    insert: String,
    update: String,
    delete: String,
}

impl ArticleQueries {
    pub(super) fn for_table(table: &str) -> Self {
        Self {
            shape: format!("SELECT {COLUMNS} FROM {table} LIMIT 0"),
            list: format!("SELECT {COLUMNS} FROM {table} ORDER BY created_at DESC, id DESC"),
            find: format!("SELECT {COLUMNS} FROM {table} WHERE id = $1"),
            insert: format!(
                "INSERT INTO {table} (title, content, published) \
                 VALUES ($1, $2, COALESCE($3, FALSE)) RETURNING {COLUMNS}"
            ),
            update: format!(
                "UPDATE {table} SET title = $2, content = $3, \
                 published = COALESCE($4, published) WHERE id = $1 RETURNING {COLUMNS}"
            ),
            delete: format!("DELETE FROM {table} WHERE id = $1"),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    content: String,
    published: bool,
    created_at: OffsetDateTime,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            published: row.published,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn list_articles(&self) -> Result<Vec<ArticleRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ArticleRow>(&self.articles.list)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }

    async fn find_article(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&self.articles.find)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn create_article(&self, draft: &ArticleDraft) -> Result<ArticleRecord, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&self.articles.insert)
            .bind(&draft.title)
            .bind(&draft.content)
            .bind(draft.published)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_article(
        &self,
        id: i64,
        draft: &ArticleDraft,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&self.articles.update)
            .bind(id)
            .bind(&draft.title)
            .bind(&draft.content)
            .bind(draft.published)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn delete_article(&self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query(&self.articles.delete)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
