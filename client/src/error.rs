//! Error taxonomy for the document API.
//!
//! Response-derived errors carry the request URL and the parsed response body (when the
//! body was JSON) so callers can log full diagnostics. All variants are `Clone`: one
//! deduplicated flight hands the same outcome to every caller that joined it.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::http::FetchResult;

static PREVIEW_TOKEN_EXPIRED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)preview token.*expired").expect("static regex"));

/// Message, URL and response body of a failed API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub message: String,
    pub url: Option<String>,
    pub response: Option<Value>,
}

impl ApiFailure {
    /// A failure raised locally, without a response behind it.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            url: None,
            response: None,
        }
    }

    fn from_response(message: String, url: &str, response: Option<Value>) -> Self {
        Self {
            message,
            url: Some(url.to_string()),
            response,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} ({})", self.message, url),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors returned by the client.
#[derive(Debug, Clone, Error)]
pub enum PrismicError {
    /// The request's abort signal fired before or while it ran.
    #[error("request aborted: {url}")]
    Aborted { url: String },

    /// Network, DNS or other transport failure; passed through unchanged.
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    /// 400: the API could not parse the query.
    #[error("parsing error: {0}")]
    Parsing(ApiFailure),

    /// 401/403: missing or invalid access token.
    #[error("forbidden: {0}")]
    Forbidden(ApiFailure),

    /// 404 `api_notfound_error`, or a ref lookup that found nothing.
    #[error("ref not found: {0}")]
    RefNotFound(ApiFailure),

    /// A release lookup that found nothing.
    #[error("release not found: {0}")]
    ReleaseNotFound(ApiFailure),

    /// 410: the ref is no longer valid.
    #[error("ref expired: {0}")]
    RefExpired(ApiFailure),

    /// 404 `api_security_error` about an expired preview token.
    #[error("preview token expired: {0}")]
    PreviewTokenExpired(ApiFailure),

    /// 404 from the repository metadata endpoint.
    #[error("repository not found: {0}")]
    RepositoryNotFound(ApiFailure),

    /// Any other 404.
    #[error("not found: {0}")]
    NotFound(ApiFailure),

    /// Invalid client configuration (endpoint, repository name, request URL).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Anything else, including malformed or non-JSON bodies.
    #[error("{0}")]
    Other(ApiFailure),
}

impl PrismicError {
    pub(crate) fn aborted(url: &str) -> Self {
        PrismicError::Aborted {
            url: url.to_string(),
        }
    }

    pub(crate) fn other(message: impl Into<String>, url: &str, response: Option<Value>) -> Self {
        PrismicError::Other(ApiFailure::from_response(message.into(), url, response))
    }

    /// The API-facing failure details, when this error came from (or mimics) an API response.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            PrismicError::Parsing(f)
            | PrismicError::Forbidden(f)
            | PrismicError::RefNotFound(f)
            | PrismicError::ReleaseNotFound(f)
            | PrismicError::RefExpired(f)
            | PrismicError::PreviewTokenExpired(f)
            | PrismicError::RepositoryNotFound(f)
            | PrismicError::NotFound(f)
            | PrismicError::Other(f) => Some(f),
            PrismicError::Aborted { .. }
            | PrismicError::Transport { .. }
            | PrismicError::Config(_) => None,
        }
    }

    /// The bare message, without the URL suffix of [`Display`](fmt::Display).
    pub fn message(&self) -> String {
        match self {
            PrismicError::Transport { message, .. } => message.clone(),
            PrismicError::Config(message) => message.clone(),
            PrismicError::Aborted { .. } => "request aborted".to_string(),
            _ => self
                .failure()
                .map(|f| f.message.clone())
                .unwrap_or_default(),
        }
    }

    /// URL of the request that failed, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            PrismicError::Aborted { url } | PrismicError::Transport { url, .. } => Some(url),
            _ => self.failure().and_then(|f| f.url.as_deref()),
        }
    }

    /// Parsed response body, if the API returned JSON.
    pub fn response(&self) -> Option<&Value> {
        self.failure().and_then(|f| f.response.as_ref())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, PrismicError::Aborted { .. })
    }
}

/// Which endpoint a response came from; a 404 means different things on each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Repository,
    Documents,
}

/// Maps a non-success response to its error kind.
pub(crate) fn error_from_response(url: &str, res: &FetchResult, endpoint: Endpoint) -> PrismicError {
    let body = res.json.clone();
    let field = |name: &str| {
        body.as_ref()
            .and_then(|b| b.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let message = field("message");
    let failure = |message: Option<String>, fallback: String| {
        ApiFailure::from_response(message.unwrap_or(fallback), url, body.clone())
    };

    match res.status {
        400 => PrismicError::Parsing(failure(message, "invalid query".to_string())),
        401 | 403 => PrismicError::Forbidden(failure(
            field("error").or(message),
            "access to this repository is forbidden".to_string(),
        )),
        404 if endpoint == Endpoint::Repository || body.is_none() => {
            PrismicError::RepositoryNotFound(failure(
                None,
                "Prismic repository not found. Check that the endpoint points to the correct repository."
                    .to_string(),
            ))
        }
        404 => match field("type").as_deref() {
            Some("api_notfound_error") => {
                PrismicError::RefNotFound(failure(message, "ref not found".to_string()))
            }
            Some("api_security_error")
                if message
                    .as_deref()
                    .is_some_and(|m| PREVIEW_TOKEN_EXPIRED.is_match(m)) =>
            {
                PrismicError::PreviewTokenExpired(failure(message, String::new()))
            }
            _ => PrismicError::NotFound(failure(message, "not found".to_string())),
        },
        410 => PrismicError::RefExpired(failure(message, "ref expired".to_string())),
        status => PrismicError::Other(failure(
            message,
            format!("unexpected response status {status}"),
        )),
    }
}
