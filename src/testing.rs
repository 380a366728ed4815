//! Testing utilities.
//!
//! [`MockFetcher`] serves canned bodies by URL so spiders and chains can be
//! exercised without network access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{FetchError, FetchResult};
use crate::fetch::{Fetcher, Response};

/// A fetcher backed by a URL → body table.
///
/// URLs without an entry fail with a 404 status error.
#[derive(Default, Clone)]
pub struct MockFetcher {
    /// Canned outcome per URL: a body, or a failing status
    responses: Arc<RwLock<HashMap<String, Result<String, u16>>>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn with_body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), Ok(body.into()));
        self
    }

    /// Serve `body` serialized as JSON for `url`.
    pub fn with_json(self, url: impl Into<String>, body: &serde_json::Value) -> Self {
        self.with_body(url, body.to_string())
    }

    /// Fail `url` with an HTTP status error.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), Err(status));
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<Response> {
        self.calls.write().unwrap().push(url.to_string());

        let outcome = self.responses.read().unwrap().get(url).cloned();
        match outcome {
            Some(Ok(body)) => Ok(Response::new(url, body)),
            Some(Err(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
