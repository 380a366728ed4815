//! Network collaborator
//!
//! The core never talks to the network directly. A [`Fetcher`] turns a URL
//! into a [`Response`]; [`HttpFetcher`] does it with reqwest and
//! [`RateLimitedFetcher`] enforces a per-source request rate on top of any
//! fetcher.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use scraper::Html;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{FetchError, FetchResult};

/// A delivered response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
        }
    }

    /// Body as JSON; anything malformed reads as an empty object.
    pub fn json(&self) -> Value {
        match serde_json::from_str::<Value>(&self.body) {
            Ok(value) if !value.is_null() => value,
            _ => Value::Object(serde_json::Map::new()),
        }
    }

    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Resolve a possibly relative link against this response's URL.
    pub fn urljoin(&self, href: &str) -> String {
        Url::parse(&self.url)
            .and_then(|base| base.join(href.trim()))
            .map_or_else(|_| href.trim().to_string(), |u| u.to_string())
    }
}

/// Fetches one URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult<Response>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> FetchResult<Response> {
        (**self).fetch(url).await
    }
}

/// Plain HTTP GET fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<Response> {
        Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;

        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                FetchError::Http(e)
            })?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(Response {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces a request rate.
pub struct RateLimitedFetcher<F: Fetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: Fetcher> RateLimitedFetcher<F> {
    /// At most `requests_per_second` (floored at 1) with the given burst.
    pub fn new(fetcher: F, requests_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(fetcher, Quota::per_second(rate).allow_burst(burst))
    }

    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str) -> FetchResult<Response> {
        self.limiter.until_ready().await;
        self.inner.fetch(url).await
    }
}
