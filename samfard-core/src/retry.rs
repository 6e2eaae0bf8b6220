use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::{EngineError, EngineResult};

/// Bounded retry with jittered exponential backoff, applied to optimistic
/// read-modify-write cycles that lost a race.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 25,
            max_delay_ms: 400,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped.max(1) / 2);
        Duration::from_millis(capped / 2 + jitter)
    }
}

/// Runs one read-compute-commit cycle per attempt. A cycle that fails on
/// contention or a store timeout is retried under the policy; exhaustion
/// surfaces as `Conflict`. Definitive rejections (`NotFound`,
/// `InvalidTransition`, `Unauthorized`) pass through untouched on the first
/// occurrence.
pub async fn run_transaction<T, F, Fut>(policy: &RetryPolicy, mut cycle: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match cycle().await {
            Err(err) if err.is_retryable() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    tracing::warn!(attempts = attempt, "transaction gave up: {}", err);
                    return Err(EngineError::Conflict { attempts: attempt });
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            other => return other,
        }
    }
}
