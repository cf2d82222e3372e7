use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Longest single sleep in [`RateLimiter::acquire`]; the bucket is re-checked after it.
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Token bucket refilled continuously at `tokens_per_sec`, holding at most
/// `max(1, tokens_per_sec)` tokens.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    pub fn new(tokens_per_sec: f64) -> Self {
        let rate = if tokens_per_sec.is_finite() && tokens_per_sec > 0.0 { tokens_per_sec } else { 1.0 };
        let burst = rate.max(1.0);
        RateLimiter {
            rate,
            burst,
            bucket: Mutex::new(Bucket { tokens: burst, last: Instant::now() }),
        }
    }

    /// Take a token if one is available, otherwise return how long to wait.
    fn try_take(&self) -> Result<(), Duration> {
        let mut b = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(b.last).as_secs_f64();
        b.tokens = (b.tokens + elapsed * self.rate).min(self.burst);
        b.last = now;
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - b.tokens) / self.rate;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(MAX_WAIT).min(MAX_WAIT))
        }
    }

    pub async fn acquire(&self) {
        while let Err(wait) = self.try_take() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// One [`RateLimiter`] per target key, created on first use.
pub struct TargetRateLimiter {
    rate: f64,
    buckets: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl TargetRateLimiter {
    pub fn new(tokens_per_sec: f64) -> Self {
        TargetRateLimiter { rate: tokens_per_sec, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn limiter_for(&self, key: &str) -> Arc<RateLimiter> {
        let mut map = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(self.rate)))
            .clone()
    }

    pub async fn acquire(&self, key: &str) {
        self.limiter_for(key).acquire().await;
    }

    pub fn targets(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
