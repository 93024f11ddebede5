use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::{RETRY_BASE_DELAY_SECS, RETRY_MAX_ATTEMPTS, RETRY_MULTIPLIER};
use crate::ingest::reconciler::Reconciler;

/// Capped exponential backoff for failed cycles. Owned by the scheduler so
/// the reconciler's own logic stays timing-free.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
            multiplier: RETRY_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based failed attempt:
    /// base * multiplier^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * self.multiplier.saturating_pow(attempt)
    }
}

/// Runs the reconciler once at startup and then on a fixed cadence. A failed
/// cycle is retried with backoff up to the attempt cap, then abandoned until
/// the next tick.
pub struct IngestScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    retry: RetryPolicy,
}

impl IngestScheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration, retry: RetryPolicy) -> Self {
        Self { reconciler, interval, retry }
    }

    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "running startup ingestion");
        self.run_cycle_with_retries().await;

        let mut ticker = interval(self.interval);
        ticker.tick().await; // consume immediate first tick — startup already ran

        loop {
            ticker.tick().await;
            self.run_cycle_with_retries().await;
        }
    }

    async fn run_cycle_with_retries(&self) {
        for attempt in 0..self.retry.max_attempts {
            match self.reconciler.run_cycle(Utc::now()).await {
                Ok(_) => return,
                Err(e) => {
                    error!(attempt, "ingestion cycle failed: {e}");
                    if attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        warn!(delay_secs = delay.as_secs(), "retrying ingestion");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        error!("ingestion abandoned until next tick");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_by_the_multiplier() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for(1), Duration::from_secs(180));
        assert_eq!(policy.delay_for(2), Duration::from_secs(540));
    }

    #[test]
    fn custom_policy_is_respected() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            multiplier: 2,
        };
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }
}
