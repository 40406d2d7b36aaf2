//! # prismic-client
//!
//! Request orchestration for the Prismic document API. A [`Client`] sits between your code
//! and an HTTP transport and decides how requests reach the network:
//!
//! - **Deduplication**: identical concurrent reads (same URL, same abort signal) share one
//!   transport call; every caller gets the same result ([`FlightRegistry`]).
//! - **Pacing**: body-bearing requests go through one FIFO queue per hostname, started at
//!   least an interval apart ([`IntervalLimiter`]).
//! - **Rate limits**: `429` responses are retried after `retry-after` ([`Dispatcher`]).
//! - **Metadata cache**: the repository descriptor is kept for a TTL ([`MetadataCache`]).
//! - **Ref resolution**: preview cookie, manual ref, release, or the master ref
//!   ([`RefResolver`]).
//! - **Stale refs**: queries rejected for an invalid or expired ref are re-issued with the
//!   master ref from the error, at most three attempts ([`InvalidRefRetry`]).
//!
//! The transport is pluggable through [`HttpClient`]; [`ReqwestHttpClient`] is the default.
//!
//! ```no_run
//! use prismic_client::{Client, ClientConfig, QueryParams};
//!
//! # async fn run() -> Result<(), prismic_client::PrismicError> {
//! let client = Client::new("my-repo", ClientConfig::default())?;
//! let page = client
//!     .get_first(QueryParams::new().with_filter(r#"[at(document.type, "homepage")]"#))
//!     .await?;
//! println!("{}", page["id"]);
//! # Ok(())
//! # }
//! ```
//!
//! Settings can also come from the environment, a `.env` file or the XDG config file; see
//! [`Client::from_env`].

pub mod client;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod query;
pub mod refs;
pub mod repository;
pub mod retry;
pub mod signal;
pub mod throttle;

pub use client::{Client, ClientConfig};
pub use dispatch::{Dispatcher, FlightOutcome, FlightRegistry, IntervalLimiter};
pub use env_config::ClientSettings;
pub use error::{ApiFailure, PrismicError};
pub use http::{
    FetchResult, HttpClient, HttpRequest, HttpResponse, Method, ReqwestHttpClient, RequestOptions,
    TransportError,
};
pub use query::{Query, QueryParams};
pub use refs::{RefResolver, RefSelection, RefSource, RequestLike, PREVIEW_COOKIE};
pub use repository::{Language, MetadataCache, Ref, Repository};
pub use retry::{InvalidRefRetry, MAX_INVALID_REF_ATTEMPTS};
pub use signal::AbortSignal;
