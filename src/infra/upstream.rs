//! HTTP client for the proxied origin.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{CONTENT_TYPE, HeaderMap},
};
use tracing::debug;

use crate::application::pages::{UpstreamError, UpstreamResponse, UpstreamSource};

use super::error::InfraError;

/// Connection-scoped headers, plus the ones re-derived from the relayed body.
const NOT_RELAYED: &[&str] = &[
    "connection",
    "content-length",
    "content-type",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone, Debug)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::upstream(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn user_agent() -> &'static str {
        concat!("readthrough/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl UpstreamSource for HttpUpstream {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, UpstreamError> {
        let transport = |err: reqwest::Error| UpstreamError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let headers = relayed_headers(response.headers());
        let body = response.bytes().await.map_err(transport)?;

        debug!(url, status, bytes = body.len(), "upstream responded");
        Ok(UpstreamResponse {
            status,
            content_type,
            headers,
            body,
        })
    }
}

fn relayed_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !NOT_RELAYED.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
