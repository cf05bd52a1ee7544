//! Postgres-backed adapters: the articles repository and the cache store.

mod articles;
mod kv;
mod util;

pub use kv::PostgresKvStore;
pub use util::{map_sqlx_error, map_store_error};

use std::sync::Arc;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    articles: Arc<articles::ArticleQueries>,
}

impl PostgresRepositories {
    /// `articles_table` must already be validated as a plain identifier.
    pub fn new(pool: PgPool, articles_table: &str) -> Self {
        Self {
            pool: Arc::new(pool),
            articles: Arc::new(articles::ArticleQueries::for_table(articles_table)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    /// Check that the configured articles table exists with the expected
    /// columns. Migrations only ever create the default `articles` table.
    pub async fn verify_articles_table(&self) -> Result<(), sqlx::Error> {
        query(&self.articles.shape)
            .execute(self.pool())
            .await
            .map(|_| ())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
