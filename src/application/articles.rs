//! Article reads and writes routed through the read-through cache.
//!
//! Reads go through [`CacheManager`]; mutations hit the repository first and
//! then refresh or invalidate the affected keys. A failed cache step after a
//! successful mutation is reported alongside the result, never in its place.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, instrument};

use crate::application::repos::{ArticlesRepo, RepoError};
use crate::cache::{
    CacheManager, CacheWriteError, InvalidationError, Invalidator, KeySpace, Lookup,
    SourceFetcher,
};
use crate::domain::articles::{ArticleDraft, ArticleInput, ArticleRecord};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("article `{0}` not found")]
    NotFound(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Cache upkeep that failed after the source of truth was already updated.
#[derive(Debug, Error)]
pub enum CacheMaintenanceError {
    #[error("write-through failed: {0}")]
    Write(#[from] CacheWriteError),
    #[error(transparent)]
    Invalidate(#[from] InvalidationError),
}

/// Result of a committed mutation.
#[derive(Debug)]
pub struct Mutation<T> {
    pub value: T,
    pub cache_error: Option<CacheMaintenanceError>,
}

impl<T> Mutation<T> {
    pub fn cache_consistent(&self) -> bool {
        self.cache_error.is_none()
    }
}

struct ListArticles<'a>(&'a dyn ArticlesRepo);

impl SourceFetcher<Vec<ArticleRecord>> for ListArticles<'_> {
    type Error = RepoError;

    fn fetch(self) -> impl Future<Output = Result<Vec<ArticleRecord>, RepoError>> + Send {
        self.0.list_articles()
    }
}

struct FindArticle<'a> {
    repo: &'a dyn ArticlesRepo,
    id: i64,
}

impl SourceFetcher<Option<ArticleRecord>> for FindArticle<'_> {
    type Error = RepoError;

    fn fetch(self) -> impl Future<Output = Result<Option<ArticleRecord>, RepoError>> + Send {
        self.repo.find_article(self.id)
    }
}

pub struct ArticleService {
    repo: Arc<dyn ArticlesRepo>,
    cache: Arc<CacheManager>,
    invalidator: Arc<Invalidator>,
    keys: KeySpace,
    ttl_minutes: i64,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticlesRepo>,
        cache: Arc<CacheManager>,
        invalidator: Arc<Invalidator>,
        keys: KeySpace,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            repo,
            cache,
            invalidator,
            keys,
            ttl_minutes,
        }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub async fn list(&self) -> Result<Lookup<Vec<ArticleRecord>>, ArticleError> {
        let lookup = self
            .cache
            .read_through(
                self.keys.aggregate_key(),
                self.ttl_minutes,
                ListArticles(self.repo.as_ref()),
            )
            .await?;
        Ok(lookup)
    }

    pub async fn get(&self, id: i64) -> Result<Lookup<ArticleRecord>, ArticleError> {
        let fetcher = FindArticle {
            repo: self.repo.as_ref(),
            id,
        };
        let lookup = self
            .cache
            .read_through_optional(&self.keys.entity_key(id), self.ttl_minutes, fetcher)
            .await?;

        match lookup.value {
            Some(value) => Ok(Lookup {
                value,
                source: lookup.source,
            }),
            None => Err(ArticleError::NotFound(id)),
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        input: ArticleInput,
    ) -> Result<Mutation<ArticleRecord>, ArticleError> {
        let draft = ArticleDraft::try_from(input)?;
        let record = self.repo.create_article(&draft).await?;
        let cache_error = self.refresh(&record).await;
        Ok(Mutation {
            value: record,
            cache_error,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: i64,
        input: ArticleInput,
    ) -> Result<Mutation<ArticleRecord>, ArticleError> {
        let draft = ArticleDraft::try_from(input)?;
        let record = self
            .repo
            .update_article(id, &draft)
            .await?
            .ok_or(ArticleError::NotFound(id))?;
        let cache_error = self.refresh(&record).await;
        Ok(Mutation {
            value: record,
            cache_error,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<Mutation<()>, ArticleError> {
        if !self.repo.delete_article(id).await? {
            return Err(ArticleError::NotFound(id));
        }

        let cache_error = self
            .invalidator
            .invalidate_with_aggregate(&self.keys.entity_key(id), self.keys.aggregate_key())
            .await
            .err()
            .map(CacheMaintenanceError::from);
        if let Some(err) = &cache_error {
            error!(article_id = id, error = %err, "cache invalidation failed after delete");
        }

        Ok(Mutation {
            value: (),
            cache_error,
        })
    }

    /// Seed the entity key and drop the aggregate. Both steps are attempted.
    async fn refresh(&self, record: &ArticleRecord) -> Option<CacheMaintenanceError> {
        let written = self
            .cache
            .write_through(&self.keys.entity_key(record.id), record, self.ttl_minutes)
            .await
            .map_err(CacheMaintenanceError::from);
        let invalidated = self
            .invalidator
            .invalidate_key(self.keys.aggregate_key())
            .await
            .map_err(CacheMaintenanceError::from);

        let err = written.and(invalidated).err()?;
        error!(article_id = record.id, error = %err, "cache maintenance failed after write");
        Some(err)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;
    use crate::cache::{CacheSource, KeyValueStore, ManualClock, MemoryStore};

    #[derive(Default)]
    struct StubRepo {
        rows: Mutex<BTreeMap<i64, ArticleRecord>>,
        reads: Mutex<usize>,
    }

    impl StubRepo {
        fn reads(&self) -> usize {
            *self.reads.lock().unwrap()
        }
    }

    #[async_trait]
    impl ArticlesRepo for StubRepo {
        async fn list_articles(&self) -> Result<Vec<ArticleRecord>, RepoError> {
            *self.reads.lock().unwrap() += 1;
            Ok(self.rows.lock().unwrap().values().rev().cloned().collect())
        }

        async fn find_article(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError> {
            *self.reads.lock().unwrap() += 1;
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn create_article(&self, draft: &ArticleDraft) -> Result<ArticleRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
            let record = ArticleRecord {
                id,
                title: draft.title.clone(),
                content: draft.content.clone(),
                published: draft.published.unwrap_or(false),
                created_at: datetime!(2024-01-01 0:00 UTC),
            };
            rows.insert(id, record.clone());
            Ok(record)
        }

        async fn update_article(
            &self,
            id: i64,
            draft: &ArticleDraft,
        ) -> Result<Option<ArticleRecord>, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            Ok(rows.get_mut(&id).map(|row| {
                row.title = draft.title.clone();
                row.content = draft.content.clone();
                if let Some(published) = draft.published {
                    row.published = published;
                }
                row.clone()
            }))
        }

        async fn delete_article(&self, id: i64) -> Result<bool, RepoError> {
            Ok(self.rows.lock().unwrap().remove(&id).is_some())
        }
    }

    fn service() -> (ArticleService, Arc<StubRepo>, Arc<MemoryStore>) {
        let repo = Arc::new(StubRepo::default());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(CacheManager::new(store.clone(), clock, 5));
        let invalidator = Arc::new(Invalidator::new(store.clone()));
        let service = ArticleService::new(
            repo.clone(),
            cache,
            invalidator,
            KeySpace::articles("articles"),
            5,
        );
        (service, repo, store)
    }

    fn input(title: &str) -> ArticleInput {
        ArticleInput {
            title: Some(title.into()),
            content: Some("body".into()),
            published: None,
        }
    }

    #[tokio::test]
    async fn create_seeds_entity_and_drops_aggregate() {
        let (service, repo, store) = service();
        service.list().await.expect("list");
        assert!(store.exists("all-articles").await.expect("exists"));

        let created = service.create(input("first")).await.expect("create");
        assert!(created.cache_consistent());
        assert!(!store.exists("all-articles").await.expect("exists"));

        let reads_before = repo.reads();
        let fetched = service.get(created.value.id).await.expect("get");
        assert_eq!(fetched.source, CacheSource::Hit);
        assert_eq!(fetched.value.title, "first");
        assert_eq!(repo.reads(), reads_before);
    }

    #[tokio::test]
    async fn missing_article_is_not_cached() {
        let (service, _repo, store) = service();
        let err = service.get(42).await.expect_err("absent");
        assert!(matches!(err, ArticleError::NotFound(42)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_touches_nothing() {
        let (service, repo, store) = service();
        let err = service
            .create(ArticleInput::default())
            .await
            .expect_err("invalid");
        assert!(matches!(err, ArticleError::Validation(_)));
        assert!(repo.rows.lock().unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_invalidates_entity_and_aggregate() {
        let (service, _repo, store) = service();
        let created = service.create(input("doomed")).await.expect("create");
        service.list().await.expect("list");

        service.delete(created.value.id).await.expect("delete");
        assert!(store.is_empty());

        let err = service.delete(created.value.id).await.expect_err("gone");
        assert!(matches!(err, ArticleError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_refreshes_cached_entity() {
        let (service, _repo, _store) = service();
        let created = service.create(input("draft")).await.expect("create");
        service.get(created.value.id).await.expect("warm");

        service
            .update(created.value.id, input("final"))
            .await
            .expect("update");
        let fetched = service.get(created.value.id).await.expect("get");
        assert!(fetched.is_hit());
        assert_eq!(fetched.value.title, "final");
    }
}
