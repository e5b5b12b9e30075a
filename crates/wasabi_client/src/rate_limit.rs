//! Optional request pacing for the upstream.
//!
//! The concurrency cap bounds requests in flight; this bounds how many
//! start per second. A zero quota leaves requests unpaced.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone, Default)]
pub struct RequestPacer {
    limiter: Option<Arc<DirectLimiter>>,
}

impl RequestPacer {
    /// Pace to `requests_per_sec`; 0 disables pacing.
    pub fn per_second(requests_per_sec: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_sec)
            .map(|n| Arc::new(GovLimiter::direct(Quota::per_second(n))));
        Self { limiter }
    }

    pub fn is_paced(&self) -> bool {
        self.limiter.is_some()
    }

    /// Wait until a request slot is available.
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
