//! Retry policy shared by every upstream call.
//!
//! Backoff before retry `n` (0-based) is `base * 2^n`. Only rate-limit and
//! transport failures are retried; anything else ends the call at once.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use common::config::UpstreamConfig;
use tokio::time::sleep;
use tracing::warn;

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// HTTP 429.
    RateLimited,
    /// Any other non-success HTTP status.
    Status(u16),
    /// Connection, timeout or body-read failure.
    Transport(String),
    /// The page body is not a JSON array.
    Decode(String),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::RateLimited | AttemptError::Transport(_))
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::RateLimited => write!(f, "rate limited (429)"),
            AttemptError::Status(code) => write!(f, "HTTP status {}", code),
            AttemptError::Transport(msg) => write!(f, "transport error: {}", msg),
            AttemptError::Decode(msg) => write!(f, "decode error: {}", msg),
        }
    }
}

impl From<AttemptError> for common::Error {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::RateLimited => common::Error::RateLimited,
            AttemptError::Status(status) => common::Error::Upstream {
                status,
                message: format!("non-retryable status {}", status),
            },
            AttemptError::Transport(msg) => common::Error::Http(msg),
            AttemptError::Decode(msg) => common::Error::Other(format!("decode error: {}", msg)),
        }
    }
}

/// Result of a retried call plus how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, AttemptError>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self::new(cfg.max_attempts, Duration::from_millis(cfg.backoff_base_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay inserted after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 0-based attempt number. No sleep follows the
    /// final attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    }
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}). Retrying in {:?}",
                        label,
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}
