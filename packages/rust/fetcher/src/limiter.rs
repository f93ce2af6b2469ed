//! Minimum-interval rate limiting between consecutive requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A single "end of last request" watermark shared by every request a
/// [`Fetcher`](crate::Fetcher) makes, regardless of origin.
///
/// The interval is measured from the *end* of the previous request, so slow
/// responses do not eat into the pause the origin is given.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter with no request on record.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// A limiter that behaves as if a request finished at `last_request`.
    pub fn with_last_request(min_interval: Duration, last_request: Instant) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(Some(last_request)),
        }
    }

    /// A limiter that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// The pause enforced after each request.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until `min_interval` has passed since the last recorded request.
    pub async fn wait(&self) {
        let last = *self.last_request.lock().await;
        let Some(last) = last else {
            return;
        };

        let ready_at = last + self.min_interval;
        let now = Instant::now();
        if ready_at > now {
            debug!(
                sleep_ms = (ready_at - now).as_millis() as u64,
                "rate limiting"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Record that a request just finished.
    pub async fn mark(&self) {
        *self.last_request.lock().await = Some(Instant::now());
    }

    /// When the last request finished, if any.
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}
