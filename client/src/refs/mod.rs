//! Which ref a query reads: the configured [`RefSelection`], preview overrides, and the
//! resolver that turns them into a ref string.

mod preview;
mod resolver;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

pub use preview::{preview_cookie, RequestLike, PREVIEW_COOKIE};
pub use resolver::RefResolver;

type RefThunk = Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// A manually chosen ref: a literal, or a function producing one on every resolution.
#[derive(Clone)]
pub enum RefSource {
    Literal(String),
    /// Called on each resolution. `None` or an empty string falls back to the master ref.
    Deferred(RefThunk),
}

impl RefSource {
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        RefSource::Deferred(Arc::new(move || f().boxed()))
    }
}

impl From<String> for RefSource {
    fn from(value: String) -> Self {
        RefSource::Literal(value)
    }
}

impl From<&str> for RefSource {
    fn from(value: &str) -> Self {
        RefSource::Literal(value.to_string())
    }
}

impl fmt::Debug for RefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSource::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            RefSource::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The ref strategy in effect. Exactly one is active at a time.
#[derive(Debug, Clone, Default)]
pub enum RefSelection {
    #[default]
    LatestPublished,
    ReleaseById(String),
    ReleaseByLabel(String),
    Manual(RefSource),
}
