use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::FetchError;

/// Per-minute and per-day request quotas plus a retry-backoff base, as one
/// value rather than a choice between two fetcher types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_day: u32,
    pub backoff_base_ms: u64,
}

impl RateLimitConfig {
    /// 150 requests/minute, 100,000/day, 400ms backoff base.
    pub fn premium() -> RateLimitConfig {
        RateLimitConfig { per_minute: 150, per_day: 100_000, backoff_base_ms: 400 }
    }

    /// 5 requests/minute, 500/day, 1000ms backoff base.
    pub fn free() -> RateLimitConfig {
        RateLimitConfig { per_minute: 5, per_day: 500, backoff_base_ms: 1_000 }
    }
}

pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    recent_requests: VecDeque<Instant>,
    daily_count: u32,
    daily_epoch_day: i64,
}

fn current_epoch_day() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
        / 86_400
}

impl RateLimiter {
    pub(crate) fn new(config: RateLimitConfig) -> RateLimiter {
        RateLimiter {
            config,
            recent_requests: VecDeque::new(),
            daily_count: 0,
            daily_epoch_day: current_epoch_day(),
        }
    }

    /// Blocks (async) until a request slot is free, or returns
    /// `FetchError::DailyLimit` if today's quota is already spent.
    pub(crate) async fn acquire(&mut self) -> Result<(), FetchError> {
        let today = current_epoch_day();
        if today != self.daily_epoch_day {
            self.daily_epoch_day = today;
            self.daily_count = 0;
        }
        if self.daily_count >= self.config.per_day {
            return Err(FetchError::DailyLimit);
        }

        loop {
            let now = Instant::now();
            while let Some(&oldest) = self.recent_requests.front() {
                if now.duration_since(oldest) >= Duration::from_secs(60) {
                    self.recent_requests.pop_front();
                } else {
                    break;
                }
            }
            if (self.recent_requests.len() as u32) < self.config.per_minute {
                break;
            }
            let oldest = *self.recent_requests.front().expect("window non-empty when at quota");
            let wait = Duration::from_secs(60).saturating_sub(now.duration_since(oldest));
            tokio::time::sleep(wait).await;
        }

        self.recent_requests.push_back(Instant::now());
        self.daily_count += 1;
        Ok(())
    }

    pub(crate) fn backoff_duration(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_allows_up_to_per_minute_quota_without_blocking() {
        let mut limiter = RateLimiter::new(RateLimitConfig { per_minute: 3, per_day: 100, backoff_base_ms: 10 });
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        assert_eq!(limiter.recent_requests.len(), 3);
    }

    #[tokio::test]
    async fn acquire_rejects_once_daily_quota_exhausted() {
        let mut limiter = RateLimiter::new(RateLimitConfig { per_minute: 100, per_day: 2, backoff_base_ms: 10 });
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert_eq!(limiter.acquire().await, Err(FetchError::DailyLimit));
    }

    #[test]
    fn backoff_duration_doubles_each_attempt() {
        let limiter = RateLimiter::new(RateLimitConfig { per_minute: 1, per_day: 1, backoff_base_ms: 100 });
        assert_eq!(limiter.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(limiter.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(limiter.backoff_duration(3), Duration::from_millis(400));
    }
}
