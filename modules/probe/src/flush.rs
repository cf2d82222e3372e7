//! End-of-batch persistence of reliability deltas with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};
use sift_core::{ReliabilityStore, ReliabilityUpdate, StoreError};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    pub attempts: u32,
    /// Error of every failed attempt, in order.
    pub errors: Vec<StoreError>,
    pub written: bool,
}

impl FlushOutcome {
    pub fn retried(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)` plus
/// up to a quarter of that again as jitter.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let jitter = thread_rng().gen_range(0..(exp / 4 + 1));
    Duration::from_millis(exp + jitter)
}

/// One `flush_batch` call on the blocking pool, so a busy database stalls
/// only that thread.
async fn flush_once(store: Arc<dyn ReliabilityStore>, updates: Arc<[ReliabilityUpdate]>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || store.flush_batch(&updates))
        .await
        .unwrap_or_else(|e| Err(StoreError::Backend(format!("flush task failed: {e}"))))
}

/// Try `flush_batch` up to `attempts` times. Never returns an error; the
/// outcome says whether the data reached the store.
pub async fn flush_with_retry(
    store: Arc<dyn ReliabilityStore>,
    updates: &[ReliabilityUpdate],
    attempts: u32,
    base_backoff: Duration,
) -> FlushOutcome {
    let mut outcome = FlushOutcome { attempts: 0, errors: Vec::new(), written: false };
    if updates.is_empty() {
        outcome.written = true;
        return outcome;
    }
    let attempts = attempts.max(1);
    let batch: Arc<[ReliabilityUpdate]> = updates.into();
    while outcome.attempts < attempts {
        outcome.attempts += 1;
        match flush_once(store.clone(), batch.clone()).await {
            Ok(()) => {
                info!(updates = updates.len(), attempts = outcome.attempts, "reliability flushed");
                outcome.written = true;
                return outcome;
            }
            Err(e) => {
                warn!(attempt = outcome.attempts, of = attempts, error = %e, "reliability flush failed");
                outcome.errors.push(e);
                if outcome.attempts < attempts {
                    tokio::time::sleep(backoff(base_backoff, outcome.attempts)).await;
                }
            }
        }
    }
    outcome
}
