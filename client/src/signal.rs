//! Abort signal: a cancellation token with identity.
//!
//! Two requests share a flight only when they carry the *same* signal (or none), so the
//! signal needs a stable identity that clones keep and fresh signals do not.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Cancellation handle passed along with a request. Clones refer to the same signal.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    id: u64,
    token: CancellationToken,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Wraps an existing token. Each call yields a distinct signal identity, even for the same
    /// token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
            token,
        }
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is aborted.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for AbortSignal {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AbortSignal {}

impl Hash for AbortSignal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
