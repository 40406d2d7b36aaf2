//! Warnings that repeat at most once per window.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Identical messages within this window are logged once.
pub const THROTTLE_WINDOW: Duration = Duration::from_secs(5);

/// Per-client warning log that suppresses repeats of the same message.
pub struct ThrottledLog {
    window: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl ThrottledLog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    /// Records `message` and reports whether it is outside the window of its last emission.
    pub fn should_emit(&self, message: &str) -> bool {
        let now = Instant::now();
        let mut last = self
            .last_logged
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last.retain(|_, at| now.duration_since(*at) < self.window);
        if last.contains_key(message) {
            return false;
        }
        last.insert(message.to_string(), now);
        true
    }

    pub fn warn(&self, message: &str) {
        if self.should_emit(message) {
            tracing::warn!("{}", message);
        }
    }
}

impl Default for ThrottledLog {
    fn default() -> Self {
        Self::new(THROTTLE_WINDOW)
    }
}
