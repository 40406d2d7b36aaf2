//! Default transport on `reqwest`. Races each request with its abort signal.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};

/// Reqwest-based HTTP client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured reqwest client, e.g. one with proxies or timeouts.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Lowercase header map; repeated headers are joined with ", ".
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if request.is_aborted() {
            return Err(TransportError::Aborted);
        }
        let mut builder = self
            .client
            .request(reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let exchange = async move {
            let res = builder
                .send()
                .await
                .map_err(|e| TransportError::Failed(e.to_string()))?;
            let status = res.status().as_u16();
            let headers = collect_headers(res.headers());
            let body = res
                .text()
                .await
                .map_err(|e| TransportError::Failed(e.to_string()))?;
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        };

        match request.signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.aborted() => Err(TransportError::Aborted),
                res = exchange => res,
            },
            None => exchange.await,
        }
    }
}
