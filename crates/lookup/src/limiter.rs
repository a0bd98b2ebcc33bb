//! Outbound lookup rate limiting: an in-process token bucket for the short
//! window, nested inside a store-backed daily cap shared across processes.
//!
//! `try_acquire` is the single serialization point for budget mutation. The
//! bucket mutex is held across the daily-counter write, so window token and
//! daily count move together — a caller never observes one consumed without
//! the other.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;

use linea_storage::{daily_count, try_increment_daily, StoreError, StorePool};

/// Outcome of a budget acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquire {
    Allowed,
    Denied(Denial),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub scope: DenialScope,
    pub retry_after: Duration,
}

/// Window denials are transient; daily denials are terminal for the day and
/// callers should stop escalating rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialScope {
    Window,
    Daily,
}

impl Denial {
    pub fn evidence_tag(&self) -> &'static str {
        match self.scope {
            DenialScope::Window => "window_exhausted",
            DenialScope::Daily => "daily_cap_exhausted",
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    pool: StorePool,
    capacity: u32,
    window: Duration,
    daily_cap: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// A fresh limiter starts with a full window bucket; the daily count comes
    /// from the shared store, so it survives process restarts.
    pub fn new(pool: StorePool, capacity: u32, window: Duration, daily_cap: u32) -> Self {
        Self {
            pool,
            capacity,
            window,
            daily_cap,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempt to consume one lookup from both budgets atomically.
    pub async fn try_acquire(&self) -> Result<Acquire, StoreError> {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);

        if bucket.tokens < 1.0 {
            let rate = self.capacity as f64 / self.window.as_secs_f64();
            let wait = (1.0 - bucket.tokens) / rate;
            return Ok(Acquire::Denied(Denial {
                scope: DenialScope::Window,
                retry_after: Duration::from_secs_f64(wait),
            }));
        }

        // Daily check-and-increment is one conditional UPDATE in the store;
        // the window token is only consumed if it succeeds.
        let day = today_key();
        if !try_increment_daily(&self.pool, &day, self.daily_cap).await? {
            return Ok(Acquire::Denied(Denial {
                scope: DenialScope::Daily,
                retry_after: until_day_rollover(),
            }));
        }

        bucket.tokens -= 1.0;
        Ok(Acquire::Allowed)
    }

    /// Lookups still available today, per the shared store.
    pub async fn daily_remaining(&self) -> Result<u32, StoreError> {
        let used = daily_count(&self.pool, &today_key()).await?;
        Ok(self.daily_cap.saturating_sub(used))
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let rate = self.capacity as f64 / self.window.as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(self.capacity as f64);
        bucket.last_refill = now;
    }
}

fn today_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn until_day_rollover() -> Duration {
    let secs_into_day = Utc::now().timestamp().rem_euclid(86_400);
    Duration::from_secs((86_400 - secs_into_day) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linea_storage::open_store_in_memory;

    #[tokio::test]
    async fn window_capacity_then_window_denial() {
        let pool = open_store_in_memory().await.unwrap();
        let limiter = RateLimiter::new(pool, 7, Duration::from_secs(60), 20);

        for i in 0..7 {
            assert_eq!(limiter.try_acquire().await.unwrap(), Acquire::Allowed, "call {i}");
        }
        match limiter.try_acquire().await.unwrap() {
            Acquire::Denied(d) => {
                assert_eq!(d.scope, DenialScope::Window);
                assert!(d.retry_after > Duration::ZERO);
                assert_eq!(d.evidence_tag(), "window_exhausted");
            }
            Acquire::Allowed => panic!("8th call must be window-denied"),
        }
    }

    #[tokio::test]
    async fn daily_cap_denial_is_terminal_for_the_day() {
        let pool = open_store_in_memory().await.unwrap();
        // Window wide enough that only the daily cap bites.
        let limiter = RateLimiter::new(pool, 25, Duration::from_secs(60), 20);

        for _ in 0..20 {
            assert_eq!(limiter.try_acquire().await.unwrap(), Acquire::Allowed);
        }
        match limiter.try_acquire().await.unwrap() {
            Acquire::Denied(d) => {
                assert_eq!(d.scope, DenialScope::Daily);
                assert_eq!(d.evidence_tag(), "daily_cap_exhausted");
                // Rollover is at most a day away.
                assert!(d.retry_after <= Duration::from_secs(86_400));
            }
            Acquire::Allowed => panic!("21st call must be daily-denied"),
        }
        assert_eq!(limiter.daily_remaining().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn daily_count_survives_limiter_restart() {
        let pool = open_store_in_memory().await.unwrap();
        {
            let limiter = RateLimiter::new(pool.clone(), 10, Duration::from_secs(60), 3);
            assert_eq!(limiter.try_acquire().await.unwrap(), Acquire::Allowed);
            assert_eq!(limiter.try_acquire().await.unwrap(), Acquire::Allowed);
        }
        // "Restarted" limiter on the same store: one acquisition left.
        let limiter = RateLimiter::new(pool, 10, Duration::from_secs(60), 3);
        assert_eq!(limiter.daily_remaining().await.unwrap(), 1);
        assert_eq!(limiter.try_acquire().await.unwrap(), Acquire::Allowed);
        assert!(matches!(
            limiter.try_acquire().await.unwrap(),
            Acquire::Denied(Denial { scope: DenialScope::Daily, .. })
        ));
    }

    #[tokio::test]
    async fn window_denial_does_not_consume_daily_budget() {
        let pool = open_store_in_memory().await.unwrap();
        let limiter = RateLimiter::new(pool, 1, Duration::from_secs(3600), 20);

        assert_eq!(limiter.try_acquire().await.unwrap(), Acquire::Allowed);
        assert!(matches!(
            limiter.try_acquire().await.unwrap(),
            Acquire::Denied(Denial { scope: DenialScope::Window, .. })
        ));
        assert_eq!(limiter.daily_remaining().await.unwrap(), 19);
    }

    #[tokio::test]
    async fn concurrent_acquires_never_exceed_capacity() {
        let pool = open_store_in_memory().await.unwrap();
        let limiter = std::sync::Arc::new(RateLimiter::new(pool, 5, Duration::from_secs(60), 20));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let l = limiter.clone();
            handles.push(tokio::spawn(async move { l.try_acquire().await.unwrap() }));
        }
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() == Acquire::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
