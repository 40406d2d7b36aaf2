//! Transport seam: the [`HttpClient`] trait, its request/response types, and the
//! materialized [`FetchResult`] handed to every consumer of a flight.

mod reqwest_client;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::signal::AbortSignal;

pub use reqwest_client::ReqwestHttpClient;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Per-call request options: an optional abort signal and extra headers.
///
/// Client-level default headers are merged underneath these (per-call wins).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub signal: Option<AbortSignal>,
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Layers these options over `defaults`.
    pub(crate) fn merged_over(&self, defaults: &BTreeMap<String, String>) -> Self {
        let mut headers = defaults.clone();
        headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            signal: self.signal.clone(),
            headers,
        }
    }
}

/// A request as seen by the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub signal: Option<AbortSignal>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            signal: None,
        }
    }

    /// A body-bearing request. These are paced per hostname and never deduplicated.
    pub fn with_body(method: Method, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method,
            body: Some(body.into()),
            ..Self::get(url)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_options(mut self, options: &RequestOptions) -> Self {
        self.headers
            .extend(options.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(signal) = &options.signal {
            self.signal = Some(signal.clone());
        }
        self
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

/// Raw response from the transport. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Transport-level failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request's abort signal fired.
    #[error("request aborted")]
    Aborted,
    #[error("{0}")]
    Failed(String),
}

/// Sends requests. Abstraction for testing and for plugging in another HTTP stack.
///
/// Implementations should honour `request.signal` when they can abort in-flight I/O.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// A response with its body already read, so many consumers can read it independently.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Parsed body, when the content type allows and the body is valid JSON.
    pub json: Option<Value>,
    /// Raw body text.
    pub text: String,
}

impl FetchResult {
    pub fn from_response(res: HttpResponse) -> Self {
        let parse = res
            .headers
            .get("content-type")
            .map_or(true, |ct| ct.contains("json"));
        let json = if parse {
            serde_json::from_str(&res.body).ok()
        } else {
            None
        };
        Self {
            status: res.status,
            headers: res.headers,
            json,
            text: res.body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Delay requested by the `retry-after` header, in seconds. `None` when absent or unparsable.
    pub fn retry_after(&self) -> Option<Duration> {
        let secs: f64 = self.header("retry-after")?.trim().parse().ok()?;
        Duration::try_from_secs_f64(secs).ok()
    }
}
