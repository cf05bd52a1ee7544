//! Upstream HTML documents proxied through the cache with an element rewrite.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, Selector, element, rewrite_str};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};
use url::Url;

use crate::cache::{CacheManager, CacheSource, Lookup, SourceFetcher, page_key};

const INDEX_DOCUMENT: &str = "/index.html";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request to `{url}` failed: {message}")]
    Transport { url: String, message: String },
}

/// Raw response from the upstream origin.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// End-to-end headers other than `content-type`, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_html(&self) -> bool {
        self.status == 200
            && self
                .content_type
                .as_deref()
                .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"))
    }
}

#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, UpstreamError>;
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("invalid rewrite selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
}

/// What the proxy answers with. Only [`PageContent::Html`] is ever cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PageContent {
    Html(String),
    Passthrough {
        status: u16,
        content_type: Option<String>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
}

impl PageContent {
    pub fn is_html(&self) -> bool {
        matches!(self, Self::Html(_))
    }
}

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub upstream: Url,
    pub cache_enabled: bool,
    pub ttl_minutes: i64,
    pub rewrite_selector: String,
    pub rewrite_text: String,
}

pub struct PageService {
    upstream: Arc<dyn UpstreamSource>,
    cache: Arc<CacheManager>,
    settings: PageSettings,
}

impl PageService {
    pub fn new(
        upstream: Arc<dyn UpstreamSource>,
        cache: Arc<CacheManager>,
        settings: PageSettings,
    ) -> Result<Self, PageError> {
        settings
            .rewrite_selector
            .parse::<Selector>()
            .map_err(|err| PageError::InvalidSelector {
                selector: settings.rewrite_selector.clone(),
                message: err.to_string(),
            })?;

        Ok(Self {
            upstream,
            cache,
            settings,
        })
    }

    /// Upstream URL for a request path; the site root maps to the index document.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.settings.upstream.as_str().trim_end_matches('/');
        let path = match path {
            "" | "/" => INDEX_DOCUMENT,
            other => other,
        };
        match query {
            Some(query) if !query.is_empty() => format!("{base}{path}?{query}"),
            _ => format!("{base}{path}"),
        }
    }

    #[instrument(skip(self))]
    pub async fn render(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<Lookup<PageContent>, PageError> {
        let url = self.upstream_url(path, query);
        let fetcher = RewritePage {
            service: self,
            url: &url,
        };

        if !self.settings.cache_enabled {
            let value = fetcher.fetch().await?;
            return Ok(Lookup {
                value,
                source: CacheSource::Miss,
            });
        }

        let lookup = self
            .cache
            .read_through_when(
                &page_key(&url),
                self.settings.ttl_minutes,
                fetcher,
                PageContent::is_html,
            )
            .await?;
        Ok(lookup)
    }

    fn rewrite(&self, html: &str) -> String {
        let text = self.settings.rewrite_text.as_str();
        let rewritten = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![element!(
                    self.settings.rewrite_selector.as_str(),
                    move |el| {
                        el.set_inner_content(text, ContentType::Text);
                        Ok(())
                    }
                )],
                ..RewriteStrSettings::default()
            },
        );

        match rewritten {
            Ok(html) => html,
            Err(err) => {
                warn!(error = %err, "html rewrite failed; serving document unmodified");
                html.to_string()
            }
        }
    }
}

struct RewritePage<'a> {
    service: &'a PageService,
    url: &'a str,
}

impl SourceFetcher<PageContent> for RewritePage<'_> {
    type Error = UpstreamError;

    fn fetch(self) -> impl Future<Output = Result<PageContent, UpstreamError>> + Send {
        async move {
            let response = self.service.upstream.get(self.url).await?;
            if !response.is_html() {
                return Ok(PageContent::Passthrough {
                    status: response.status,
                    content_type: response.content_type,
                    headers: response.headers,
                    body: response.body.to_vec(),
                });
            }

            let html = String::from_utf8_lossy(&response.body);
            Ok(PageContent::Html(self.service.rewrite(&html)))
        }
    }
}
