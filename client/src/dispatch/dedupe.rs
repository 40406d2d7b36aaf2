//! Request deduplication: one flight per `(url, abort signal)`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::PrismicError;
use crate::http::FetchResult;
use crate::signal::AbortSignal;

/// Outcome of a flight, shared by every caller that joined it.
pub type FlightOutcome = Result<Arc<FetchResult>, PrismicError>;

type FlightFuture = Shared<BoxFuture<'static, FlightOutcome>>;

struct Flight {
    id: u64,
    future: FlightFuture,
}

/// Registry of in-flight requests, bucketed by URL and then by signal.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct FlightRegistry {
    flights: Arc<DashMap<String, HashMap<Option<AbortSignal>, Flight>>>,
    next_id: Arc<AtomicU64>,
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the live flight for `(url, signal)`, or starts one with `start`.
    ///
    /// Lookup and registration happen under one map lock with no await in between. A
    /// started flight is spawned: it runs to completion and leaves the registry on
    /// settlement even if every caller has gone away.
    pub async fn dedupe<S, Fut>(&self, url: &str, signal: Option<&AbortSignal>, start: S) -> FlightOutcome
    where
        S: FnOnce() -> Fut,
        Fut: Future<Output = FlightOutcome> + Send + 'static,
    {
        let key = signal.cloned();
        let future = {
            // The entry guard spans lookup, start and insert; splitting them lets two callers both start.
            let mut bucket = self.flights.entry(url.to_string()).or_default();
            match bucket.get(&key) {
                Some(flight) => {
                    tracing::debug!(url, "joining in-flight request");
                    flight.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = self.spawn_flight(url, key.clone(), id, start());
                    bucket.insert(
                        key,
                        Flight {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };
        future.await
    }

    fn spawn_flight<Fut>(&self, url: &str, key: Option<AbortSignal>, id: u64, work: Fut) -> FlightFuture
    where
        Fut: Future<Output = FlightOutcome> + Send + 'static,
    {
        tracing::debug!(url, "starting request");
        let registry = self.clone();
        let owned_url = url.to_string();
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            registry.settle(&owned_url, &key, id);
            outcome
        });
        let url = url.to_string();
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(PrismicError::Transport {
                    url,
                    message: format!("request task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared()
    }

    /// Drops the settled flight and, if its URL bucket is now empty, the bucket.
    fn settle(&self, url: &str, key: &Option<AbortSignal>, id: u64) {
        if let Some(mut bucket) = self.flights.get_mut(url) {
            if bucket.get(key).is_some_and(|flight| flight.id == id) {
                bucket.remove(key);
            }
        }
        self.flights.remove_if(url, |_, bucket| bucket.is_empty());
    }

    /// Number of flights currently registered.
    pub fn in_flight(&self) -> usize {
        self.flights.iter().map(|bucket| bucket.len()).sum()
    }

    /// Number of URL buckets currently registered.
    pub fn buckets(&self) -> usize {
        self.flights.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn ok_result(status: u16) -> FlightOutcome {
        Ok(Arc::new(FetchResult {
            status,
            headers: HashMap::new(),
            json: None,
            text: String::new(),
        }))
    }

    fn slow_start(calls: Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, FlightOutcome> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                ok_result(200)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_flight() {
        let registry = FlightRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let url = "https://example.com/a";

        let (a, b, c) = tokio::join!(
            registry.dedupe(url, None, slow_start(calls.clone())),
            registry.dedupe(url, None, slow_start(calls.clone())),
            registry.dedupe(url, None, slow_start(calls.clone())),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let a = a.unwrap();
        assert!(Arc::ptr_eq(&a, &b.unwrap()));
        assert!(Arc::ptr_eq(&a, &c.unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_signals_get_distinct_flights() {
        let registry = FlightRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let url = "https://example.com/a";
        let (s1, s2) = (AbortSignal::new(), AbortSignal::new());

        let (a, b) = tokio::join!(
            registry.dedupe(url, Some(&s1), slow_start(calls.clone())),
            registry.dedupe(url, Some(&s2), slow_start(calls.clone())),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_flights_leave_the_registry() {
        let registry = FlightRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .dedupe("https://example.com/a", None, slow_start(calls.clone()))
            .await
            .unwrap();
        assert_eq!(registry.in_flight(), 0);
        assert_eq!(registry.buckets(), 0);

        registry
            .dedupe("https://example.com/a", None, slow_start(calls.clone()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_shared_and_cleaned_up() {
        let registry = FlightRegistry::new();
        let url = "https://example.com/fail";
        let start = || {
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err::<Arc<FetchResult>, _>(PrismicError::Transport {
                    url: "https://example.com/fail".to_string(),
                    message: "connection reset".to_string(),
                })
            }
            .boxed()
        };
        let (a, b) = tokio::join!(registry.dedupe(url, None, start), registry.dedupe(url, None, start));
        assert!(matches!(a, Err(PrismicError::Transport { .. })));
        assert!(matches!(b, Err(PrismicError::Transport { .. })));
        assert_eq!(registry.buckets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flight_completes_after_callers_drop() {
        let registry = FlightRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let pending = registry.dedupe("https://example.com/a", None, slow_start(calls.clone()));
        let _ = tokio::time::timeout(Duration::from_millis(1), pending).await;
        assert_eq!(registry.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.in_flight(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
