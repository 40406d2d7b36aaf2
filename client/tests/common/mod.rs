//! Scripted mock transport shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prismic_client::{HttpClient, HttpRequest, HttpResponse, TransportError};
use serde_json::{json, Value};
use tokio::time::Instant;
use url::Url;

pub const ENDPOINT: &str = "https://repo.cdn.prismic.io/api/v2";
pub const METADATA_PATH: &str = "/api/v2";
pub const SEARCH_PATH: &str = "/api/v2/documents/search";

type Handler = Box<dyn Fn(&HttpRequest, usize) -> HttpResponse + Send + Sync>;

/// One recorded transport call.
#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub at: Instant,
}

/// Answers each request with the handler registered for its URL path. The handler also gets
/// how many earlier calls hit the same path.
pub struct MockApi {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<Call>>,
    latency: Duration,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn route<F>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> HttpResponse + Send + Sync + 'static,
    {
        self.handlers.insert(path.to_string(), Box::new(handler));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    /// URLs of calls to `path`, in order.
    pub fn urls(&self, path: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .map(|c| c.url)
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockApi {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = Url::parse(&request.url).unwrap().path().to_string();
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            let nth = calls.iter().filter(|c| c.path == path).count();
            calls.push(Call {
                path: path.clone(),
                url: request.url.clone(),
                headers: request
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                at: Instant::now(),
            });
            nth
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.handlers.get(&path) {
            Some(handler) => Ok(handler(&request, nth)),
            None => Ok(json_response(404, json!({"message": "no route"}))),
        }
    }
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
        body: body.to_string(),
    }
}

/// Repository descriptor with master ref `master` and one release `Spring` (`RELEASE`).
pub fn repository_body(master: &str) -> Value {
    json!({
        "refs": [
            {"id": "master", "ref": master, "label": "Master", "isMasterRef": true},
            {"id": "spring", "ref": "RELEASE", "label": "Spring"}
        ],
        "integrationFieldsRef": null,
        "languages": [{"id": "en-us", "name": "English - United States"}],
        "types": {"page": "Page"},
        "tags": ["blog", "news"],
        "version": "abc123",
        "license": "All Rights Reserved"
    })
}

/// Search response holding `results`.
pub fn search_body(results: Vec<Value>) -> Value {
    let n = results.len();
    json!({
        "page": 1,
        "results_per_page": n,
        "results_size": n,
        "total_results_size": n,
        "total_pages": 1,
        "next_page": null,
        "prev_page": null,
        "results": results
    })
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    prismic_client::query::query_param(url, name)
}

pub fn arc(api: MockApi) -> Arc<MockApi> {
    Arc::new(api)
}
