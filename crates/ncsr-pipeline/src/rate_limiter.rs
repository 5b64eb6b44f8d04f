use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use ncsr_core::{AppError, AppResult};

/// **Rate Limiter for SEC EDGAR**
///
/// Enforces the minimum inter-request interval the SEC asks for (10 req/s by
/// default). The limiter is shared by every caller in the process: the
/// fetcher acquires a permit before each request, including HEAD probes and
/// retries, so concurrent workers can never exceed the cap together.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limiter: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,

    /// Minimum gap between requests
    min_interval: Duration,
}

impl RateLimiter {
    /// Create a rate limiter with a minimum gap between requests.
    ///
    /// Fails if the interval is zero; SEC access always needs a positive gap.
    pub fn new(min_interval: Duration) -> AppResult<Self> {
        let quota = Quota::with_period(min_interval).ok_or_else(|| {
            AppError::config_error("rate limit interval must be greater than zero")
        })?;
        let limiter = Arc::new(GovernorLimiter::direct(quota));

        Ok(Self {
            limiter,
            min_interval,
        })
    }

    /// Rate limiter with the SEC EDGAR recommended settings (10 req/s)
    pub fn sec_edgar() -> Self {
        let quota = Quota::per_second(nonzero!(10u32));
        Self {
            limiter: Arc::new(GovernorLimiter::direct(quota)),
            min_interval: Duration::from_millis(100),
        }
    }

    /// Wait until a permit is available.
    ///
    /// Must be called before every HTTP request to the SEC.
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
        debug!("Rate limit permit granted");
    }

    /// Try to get a permit without waiting
    pub fn try_permit(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// The configured minimum gap between requests
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(RateLimiter::new(Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_first_permit_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(50)).unwrap();

        let start = Instant::now();
        limiter.wait_for_permit().await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_second_permit_waits_for_interval() {
        // REQUIREMENT: The limiter enforces a minimum gap between requests
        // PURPOSE: Verify back-to-back callers are actually spaced out
        let limiter = RateLimiter::new(Duration::from_millis(100)).unwrap();

        let start = Instant::now();
        limiter.wait_for_permit().await;
        limiter.wait_for_permit().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_the_budget() {
        // REQUIREMENT: The limiter is process-wide across concurrent callers
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(50)).unwrap());

        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.wait_for_permit().await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        // 4 permits at 50ms spacing: at least 150ms total
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_try_permit() {
        let limiter = RateLimiter::new(Duration::from_secs(1)).unwrap();

        assert!(limiter.try_permit());
        assert!(!limiter.try_permit());
    }
}
