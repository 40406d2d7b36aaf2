//! Metadata cache: the repository descriptor, kept for a fixed TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::Repository;
use crate::dispatch::Dispatcher;
use crate::error::{error_from_response, Endpoint, PrismicError};
use crate::http::{HttpRequest, RequestOptions};

/// How long a fetched descriptor is served without refetching.
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_millis(5000);

struct Cached {
    repository: Arc<Repository>,
    expires_at: Instant,
}

/// Caches the descriptor fetched from the metadata endpoint.
///
/// Concurrent reads of an expired cache may each start a fetch; the dispatcher collapses
/// identical in-flight reads of the metadata URL into one transport call.
pub struct MetadataCache {
    dispatcher: Dispatcher,
    url: String,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl MetadataCache {
    /// `url` is the metadata endpoint, access token included.
    pub fn new(dispatcher: Dispatcher, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            dispatcher,
            url: url.into(),
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Cached descriptor while fresh, otherwise a new one from the endpoint.
    pub async fn get(&self, options: &RequestOptions) -> Result<Arc<Repository>, PrismicError> {
        if let Some(repository) = self.fresh().await {
            return Ok(repository);
        }
        let repository = Arc::new(self.fetch(options).await?);
        *self.cached.write().await = Some(Cached {
            repository: Arc::clone(&repository),
            expires_at: Instant::now() + self.ttl,
        });
        tracing::debug!(url = %self.url, "repository metadata refreshed");
        Ok(repository)
    }

    /// The cached descriptor, unless it has expired.
    pub async fn fresh(&self) -> Option<Arc<Repository>> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| Instant::now() < c.expires_at)
            .map(|c| Arc::clone(&c.repository))
    }

    /// Expires the cached descriptor so the next read refetches.
    pub async fn invalidate(&self) {
        if let Some(cached) = self.cached.write().await.as_mut() {
            cached.expires_at = Instant::now();
        }
    }

    async fn fetch(&self, options: &RequestOptions) -> Result<Repository, PrismicError> {
        let request = HttpRequest::get(&self.url)
            .with_header("accept", "application/json")
            .with_options(options);
        let res = self.dispatcher.dispatch(request).await?;
        if !res.is_success() {
            return Err(error_from_response(&self.url, &res, Endpoint::Repository));
        }
        let json = res.json.clone().ok_or_else(|| {
            PrismicError::other("repository metadata is not valid JSON", &self.url, None)
        })?;
        serde_json::from_value(json.clone()).map_err(|e| {
            PrismicError::other(
                format!("unexpected repository metadata shape: {e}"),
                &self.url,
                Some(json),
            )
        })
    }
}
