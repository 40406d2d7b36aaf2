//! Rate-limited dispatcher.
//!
//! Body-bearing requests are paced through one [`IntervalLimiter`] per hostname and are never
//! coalesced. Body-less requests go through the [`FlightRegistry`], so identical concurrent
//! reads share one transport call. A `429` is retried after the server's `retry-after` delay
//! for as long as the server keeps answering `429`; the request's abort signal ends the wait.

mod dedupe;
mod limiter;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use url::Url;

use crate::error::PrismicError;
use crate::http::{FetchResult, HttpClient, HttpRequest, TransportError};

pub use dedupe::{FlightOutcome, FlightRegistry};
pub use limiter::IntervalLimiter;

/// Wait before retrying a `429` that carries no usable `retry-after` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(1500);

/// Minimum spacing between body-bearing requests to one hostname.
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(1500);

/// Routes requests to the transport. Cheap to clone; clones share flights and queues.
#[derive(Clone)]
pub struct Dispatcher {
    http_client: Arc<dyn HttpClient>,
    flights: FlightRegistry,
    queues: Arc<DashMap<String, Arc<IntervalLimiter>>>,
    interval: Duration,
    retry_after_fallback: Duration,
}

impl Dispatcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            flights: FlightRegistry::new(),
            queues: Arc::new(DashMap::new()),
            interval: DEFAULT_REQUEST_INTERVAL,
            retry_after_fallback: DEFAULT_RETRY_AFTER,
        }
    }

    /// Spacing used for hostname queues created from now on.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retry_after_fallback(mut self, delay: Duration) -> Self {
        self.retry_after_fallback = delay;
        self
    }

    pub fn flights(&self) -> &FlightRegistry {
        &self.flights
    }

    /// Sends `request`, retrying while the server answers `429`.
    ///
    /// Any other response, success or error status, is returned as is.
    pub async fn dispatch(&self, request: HttpRequest) -> Result<Arc<FetchResult>, PrismicError> {
        loop {
            let res = self.dispatch_once(&request).await?;
            if !res.is_rate_limited() {
                return Ok(res);
            }
            let delay = res.retry_after().unwrap_or(self.retry_after_fallback);
            tracing::debug!(
                url = %request.url,
                delay_ms = delay.as_millis() as u64,
                "rate limited, retrying after delay"
            );
            self.back_off(delay, &request).await?;
        }
    }

    async fn dispatch_once(&self, request: &HttpRequest) -> FlightOutcome {
        if request.is_aborted() {
            return Err(PrismicError::aborted(&request.url));
        }
        if request.body.is_some() {
            return self.dispatch_queued(request).await;
        }
        let http_client = Arc::clone(&self.http_client);
        let owned = request.clone();
        let shared = self
            .flights
            .dedupe(&request.url, request.signal.as_ref(), move || {
                perform(http_client, owned)
            });
        until_aborted(request, shared).await
    }

    async fn dispatch_queued(&self, request: &HttpRequest) -> FlightOutcome {
        let limiter = self.limiter_for(&request.url)?;
        let task = perform(Arc::clone(&self.http_client), request.clone());
        let queued = async {
            limiter.schedule(task).await.unwrap_or_else(|e| {
                Err(PrismicError::Transport {
                    url: request.url.clone(),
                    message: format!("request task failed: {e}"),
                })
            })
        };
        until_aborted(request, queued).await
    }

    /// The hostname's queue, created on first use and kept for the dispatcher's lifetime.
    fn limiter_for(&self, url: &str) -> Result<Arc<IntervalLimiter>, PrismicError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| PrismicError::Config(format!("cannot determine hostname of {url}")))?;
        let limiter = self
            .queues
            .entry(host)
            .or_insert_with(|| Arc::new(IntervalLimiter::new(self.interval)));
        Ok(Arc::clone(limiter.value()))
    }

    async fn back_off(&self, delay: Duration, request: &HttpRequest) -> Result<(), PrismicError> {
        match &request.signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.aborted() => Err(PrismicError::aborted(&request.url)),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

/// Races `work` against the request's abort signal.
///
/// A flight is only shared by callers holding the same signal, so rejecting here rejects
/// every caller of that flight; the spawned transport call still settles in the background.
async fn until_aborted<F>(request: &HttpRequest, work: F) -> FlightOutcome
where
    F: Future<Output = FlightOutcome>,
{
    match &request.signal {
        Some(signal) => tokio::select! {
            biased;
            _ = signal.aborted() => Err(PrismicError::aborted(&request.url)),
            outcome = work => outcome,
        },
        None => work.await,
    }
}

/// One transport call, with the body read into a [`FetchResult`].
async fn perform(http_client: Arc<dyn HttpClient>, request: HttpRequest) -> FlightOutcome {
    if request.is_aborted() {
        return Err(PrismicError::aborted(&request.url));
    }
    let url = request.url.clone();
    match http_client.send(request).await {
        Ok(res) => Ok(Arc::new(FetchResult::from_response(res))),
        Err(TransportError::Aborted) => Err(PrismicError::Aborted { url }),
        Err(TransportError::Failed(message)) => Err(PrismicError::Transport { url, message }),
    }
}
