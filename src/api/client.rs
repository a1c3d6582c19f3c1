//! Authenticated HTTP client for the OSDU APIs
//!
//! Wraps reqwest::Client with bearer token injection, the partition header
//! and a single re-authentication retry on 401.

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::ApiError;
use crate::auth::TokenManager;
use crate::catalog::Catalog;
use crate::models::{SearchQuery, SearchResponse};

const PARTITION_HEADER: &str = "data-partition-id";
pub(super) const SEARCH_PATH: &str = "/api/search/v2/query";

pub struct OsduClient {
    http: reqwest::Client,
    base_url: Url,
    partition_id: String,
    tokens: Arc<TokenManager>,
    catalog: Arc<Catalog>,
}

impl OsduClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        partition_id: String,
        tokens: Arc<TokenManager>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            http,
            base_url,
            partition_id,
            tokens,
            catalog,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Absolute URL for an API path, keeping any path prefix of the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, ApiError> {
        let full = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&full).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", full, e)))
    }

    /// `path` with `segment` appended as one percent-encoded path segment.
    pub(crate) fn url_with_segment(&self, path: &str, segment: &str) -> Result<Url, ApiError> {
        let mut url = self.url(path)?;
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(format!("{} cannot be a base", base)))?
            .push(segment);
        Ok(url)
    }

    /// Run a search query.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ApiError> {
        let url = self.url(SEARCH_PATH)?;
        tracing::debug!("Search {} (limit {}, offset {})", query.label(), query.limit, query.offset);
        let resp: SearchResponse = self.post_json(&url, query).await?;
        tracing::debug!("Search {} returned {} records", query.label(), resp.results.len());
        Ok(resp)
    }

    /// GET with bearer auth, decoding the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        tracing::debug!("OSDU GET {}", url);
        let resp = self.execute(url, || self.http.get(url.clone())).await?;
        decode(resp, url).await
    }

    /// POST a JSON body with bearer auth, decoding the JSON response.
    pub async fn post_json<B, T>(&self, url: &Url, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("OSDU POST {}", url);
        let resp = self
            .execute(url, || self.http.post(url.clone()).json(body))
            .await?;
        decode(resp, url).await
    }

    /// Send with the current token. On 401 the rejected token is invalidated
    /// (unless a concurrent request already replaced it) and the request is
    /// sent once more with the manager's current token.
    async fn execute<F>(&self, url: &Url, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.tokens.get_token().await?;
        let resp = self.send(build(), &token.access_token, url).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_response(resp, url).await;
        }

        tracing::warn!("401 Unauthorized for {}; re-authenticating", url);
        if let Err(e) = self.tokens.invalidate_if(&token.access_token).await {
            tracing::warn!("Failed to clear token cache: {}", e);
        }
        let token = self.tokens.get_token().await?;
        let resp = self.send(build(), &token.access_token, url).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::error!("401 Unauthorized for {} with a fresh token", url);
            return Err(ApiError::UpstreamRejected {
                url: url.to_string(),
            });
        }
        check_response(resp, url).await
    }

    async fn send(
        &self,
        request: RequestBuilder,
        access_token: &str,
        url: &Url,
    ) -> Result<reqwest::Response, ApiError> {
        request
            .bearer_auth(access_token)
            .header(PARTITION_HEADER, &self.partition_id)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(500).collect();
        return Err(ApiError::Upstream {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, url: &Url) -> Result<T, ApiError> {
    resp.json().await.map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}
