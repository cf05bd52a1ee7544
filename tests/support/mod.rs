//! Shared fixtures for router-level tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Method, Request, Response, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use readthrough::{
    application::{
        articles::ArticleService,
        pages::{PageService, PageSettings, UpstreamError, UpstreamResponse, UpstreamSource},
        repos::{ArticlesRepo, RepoError},
    },
    cache::{CacheManager, Invalidator, KeySpace, KeyValueStore, ManualClock, MemoryStore, StoreError},
    domain::articles::{ArticleDraft, ArticleRecord},
    infra::http::{AppState, WEBHOOK_TOKEN_HEADER, WebhookState, build_router},
};
use time::{Duration, macros::datetime};
use tower::ServiceExt;
use url::Url;

pub const TOKEN: &str = "s3cret";
pub const TTL_MINUTES: i64 = 5;
pub const ORIGIN: &str = "https://origin.test";

/// Memory store whose writes and deletes can be made to fail.
#[derive(Default)]
pub struct TestStore {
    pub inner: MemoryStore,
    fail_mutations: AtomicBool,
}

impl TestStore {
    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for TestStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }
}

#[derive(Default)]
pub struct InMemoryArticles {
    rows: Mutex<BTreeMap<i64, ArticleRecord>>,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
}

impl InMemoryArticles {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Change a row behind the cache's back, as another writer would.
    pub fn rename(&self, id: i64, title: &str) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.title = title.to_string();
        }
    }

    fn read(&self) -> Result<(), RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ArticlesRepo for InMemoryArticles {
    async fn list_articles(&self) -> Result<Vec<ArticleRecord>, RepoError> {
        self.read()?;
        let mut rows: Vec<_> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn find_article(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError> {
        self.read()?;
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
            created_at: datetime!(2024-01-01 0:00 UTC) + Duration::minutes(id),
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

#[derive(Default)]
pub struct FakeUpstream {
    pages: Mutex<HashMap<String, UpstreamResponse>>,
    requests: AtomicUsize,
    offline: AtomicBool,
}

impl FakeUpstream {
    pub fn serve(&self, path: &str, content_type: &str, body: &str) {
        self.serve_status(path, 200, content_type, body);
    }

    pub fn serve_status(&self, path: &str, status: u16, content_type: &str, body: &str) {
        self.serve_with_headers(path, status, content_type, &[], body);
    }

    pub fn serve_with_headers(
        &self,
        path: &str,
        status: u16,
        content_type: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) {
        self.pages.lock().unwrap().insert(
            format!("{ORIGIN}{path}"),
            UpstreamResponse {
                status,
                content_type: Some(content_type.to_string()),
                headers: headers
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                body: Bytes::from(body.to_string()),
            },
        );
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamSource for FakeUpstream {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(UpstreamError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(UpstreamResponse {
                status: 404,
                content_type: Some("text/plain".to_string()),
                headers: Vec::new(),
                body: Bytes::from_static(b"not found"),
            }))
    }
}

pub struct Options {
    pub token: Option<String>,
    pub with_database: bool,
    pub with_upstream: bool,
    pub cache_pages: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            token: Some(TOKEN.to_string()),
            with_database: true,
            with_upstream: true,
            cache_pages: true,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<TestStore>,
    pub clock: Arc<ManualClock>,
    pub repo: Arc<InMemoryArticles>,
    pub upstream: Arc<FakeUpstream>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let store = Arc::new(TestStore::default());
        let clock = Arc::new(ManualClock::starting_now());
        let repo = Arc::new(InMemoryArticles::default());
        let upstream = Arc::new(FakeUpstream::default());

        let cache = Arc::new(CacheManager::new(store.clone(), clock.clone(), TTL_MINUTES));
        let invalidator = Arc::new(Invalidator::new(store.clone()));
        let keys = KeySpace::articles("articles");

        let articles = options.with_database.then(|| {
            Arc::new(ArticleService::new(
                repo.clone(),
                cache.clone(),
                invalidator.clone(),
                keys.clone(),
                TTL_MINUTES,
            ))
        });

        let pages = options.with_upstream.then(|| {
            let settings = PageSettings {
                upstream: Url::parse(ORIGIN).expect("origin url"),
                cache_enabled: options.cache_pages,
                ttl_minutes: TTL_MINUTES,
                rewrite_selector: "h1".to_string(),
                rewrite_text: "Cached heading".to_string(),
            };
            Arc::new(
                PageService::new(upstream.clone(), cache.clone(), settings)
                    .expect("page service"),
            )
        });

        let webhook = Arc::new(WebhookState::new(options.token, invalidator, keys));

        let router = build_router(AppState {
            articles,
            pages,
            webhook,
            db: None,
        });

        Self {
            router,
            store,
            clock,
            repo,
            upstream,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(request(Method::GET, uri, Body::empty())).await
    }

    pub async fn send_json(&self, method: Method, uri: &str, body: &str) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build");
        self.send(request).await
    }

    pub async fn inform(&self, token: Option<&str>, body: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/inform")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(WEBHOOK_TOKEN_HEADER, token);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request should build");
        self.send(request).await
    }

    /// Put a raw value under `key`, bypassing the cache manager.
    pub async fn seed(&self, key: &str) {
        self.store
            .inner
            .set(key, Bytes::from_static(b"{}"))
            .await
            .expect("seed store");
    }
}

pub fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .expect("request should build")
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).expect("utf-8 body")
}

pub fn served_from_cache(response: &Response<Body>) -> bool {
    response
        .headers()
        .get("x-served-via-cache")
        .is_some_and(|value| value == "true")
}
