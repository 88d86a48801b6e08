//! Per-tier pacing and bounded retry.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::errors::FetchError;
use crate::model::{ProductIdentifier, Tier};

/// Attempt budget and backoff curve applied to each tier independently.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Lower bound on how long a tier stays paused after a 429.
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            rate_limit_cooldown: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn rate_limit_pause(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(Duration::ZERO)
            .max(self.rate_limit_cooldown)
    }
}

/// Shared request spacing for one tier. Clones share the same schedule, so a
/// pause triggered by one worker holds every worker on that tier.
#[derive(Debug, Clone)]
pub struct TierThrottle {
    tier: Tier,
    min_interval: Duration,
    next_allowed: Arc<Mutex<Instant>>,
}

impl TierThrottle {
    pub fn new(tier: Tier, min_interval: Duration) -> Self {
        Self {
            tier,
            min_interval,
            next_allowed: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Reserve the next slot and sleep until it arrives.
    pub async fn wait(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        let now = Instant::now();
        let wait_until = if now >= *next_allowed {
            now
        } else {
            *next_allowed
        };
        let sleep_duration = wait_until.saturating_duration_since(now);
        *next_allowed = wait_until + self.min_interval;
        drop(next_allowed);

        if !sleep_duration.is_zero() {
            sleep(sleep_duration).await;
        }
    }

    /// Push the next slot out by at least `pause` from now. Never shortens an
    /// existing pause.
    pub async fn pause_for(&self, pause: Duration) {
        let mut next_allowed = self.next_allowed.lock().await;
        let until = Instant::now() + pause;
        if until > *next_allowed {
            *next_allowed = until;
        }
    }
}

/// Run `op` under the tier throttle until it succeeds, fails permanently, or
/// the attempt budget runs out. A rate-limited attempt pauses the whole tier.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    throttle: &TierThrottle,
    asin: &ProductIdentifier,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let tier = throttle.tier();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        throttle.wait().await;
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(asin = %asin, tier = %tier, attempt, error = %err, "non-retryable failure");
            return Err(err);
        }

        let delay = match &err {
            FetchError::RateLimited { retry_after } => {
                let pause = policy.rate_limit_pause(*retry_after);
                warn!(asin = %asin, tier = %tier, attempt, pause_ms = pause.as_millis() as u64, "rate limited; pausing tier");
                throttle.pause_for(pause).await;
                // The throttle already holds the next request back.
                Duration::ZERO
            }
            _ => policy.backoff_for(attempt),
        };

        if attempt >= policy.max_attempts {
            warn!(asin = %asin, tier = %tier, attempts = attempt, error = %err, "retry budget exhausted");
            return Err(err);
        }

        debug!(asin = %asin, tier = %tier, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
