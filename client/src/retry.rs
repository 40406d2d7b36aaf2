//! Invalid-ref retry controller.
//!
//! A query whose ref the API reports as unknown (404 `api_notfound_error`) or expired (410)
//! is retried with the master ref named in the error message, up to
//! [`MAX_INVALID_REF_ATTEMPTS`] attempts in total. Rate limiting is handled separately, and
//! without a cap, by the dispatcher.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PrismicError;

/// Total attempts for one query, the first included.
pub const MAX_INVALID_REF_ATTEMPTS: usize = 3;

static MASTER_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)master ref is: (?P<ref>.*)$").expect("static regex"));

/// Why a ref was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefIssue {
    Invalid,
    Expired,
}

impl fmt::Display for RefIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefIssue::Invalid => "invalid",
            RefIssue::Expired => "expired",
        })
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Retry { master_ref: String, issue: RefIssue },
    GiveUp,
}

/// Attempt counter for one logical query. Starts at attempt 1.
#[derive(Debug, Clone)]
pub struct InvalidRefRetry {
    attempt: usize,
    max_attempts: usize,
}

impl InvalidRefRetry {
    pub fn new() -> Self {
        Self::with_max_attempts(MAX_INVALID_REF_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            attempt: 1,
            max_attempts,
        }
    }

    /// The attempt currently being made (1-based).
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Decides on the error of the current attempt; on `Retry` the counter advances.
    pub fn next(&mut self, err: &PrismicError) -> Attempt {
        let issue = match err {
            PrismicError::RefNotFound(_) => RefIssue::Invalid,
            PrismicError::RefExpired(_) => RefIssue::Expired,
            _ => return Attempt::GiveUp,
        };
        if self.attempt >= self.max_attempts {
            return Attempt::GiveUp;
        }
        let Some(master_ref) = master_ref_from_message(&err.message()) else {
            return Attempt::GiveUp;
        };
        self.attempt += 1;
        Attempt::Retry { master_ref, issue }
    }
}

impl Default for InvalidRefRetry {
    fn default() -> Self {
        Self::new()
    }
}

/// The ref after `master ref is:` in an API error message.
pub fn master_ref_from_message(message: &str) -> Option<String> {
    MASTER_REF
        .captures(message.trim_end())
        .and_then(|c| c.name("ref"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty())
}
