//! Pacing and throttling-aware retries for calls to the spreadsheet backend.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Errors that can tell the gate whether the remote side asked us to slow down.
pub trait Throttled {
    fn is_throttled(&self) -> bool;
}

/// Single source of truth for pacing and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// Minimum time between two dispatches.
    pub min_spacing: Duration,
    /// Attempts per operation, including the first one.
    pub max_attempts: u32,
    /// Unit of the exponential backoff; attempt `n` waits `2^n` units.
    pub initial_backoff: Duration,
    /// Ceiling applied to any single backoff wait.
    pub max_backoff: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_millis(2_000),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1_000),
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

impl GatePolicy {
    /// Wait applied after the `attempt`-th (1-based) throttled failure.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Error)]
pub enum GateError<E> {
    #[error("failed after {attempts} retries")]
    RetriesExhausted { attempts: u32 },
    #[error("{0}")]
    Operation(E),
}

impl<E> GateError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, GateError::RetriesExhausted { .. })
    }
}

/// Wraps remote operations with spacing and retry-on-429 behaviour.
#[derive(Debug)]
pub struct AccessGate {
    policy: GatePolicy,
    last_dispatch: Mutex<Option<Instant>>,
}

impl AccessGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails with a non-throttling error,
    /// or the attempt ceiling is reached.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, GateError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Throttled + fmt::Display,
    {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            self.wait_for_quota().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_throttled() => {
                    if attempt == max_attempts {
                        warn!(operation = label, attempt, max_attempts, "rate limited on final attempt");
                        break;
                    }
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "rate limited, waiting before retry"
                    );
                    sleep(backoff).await;
                }
                Err(err) => return Err(GateError::Operation(err)),
            }
        }

        Err(GateError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    // The dispatch instant is recorded after the wait, before the call runs.
    async fn wait_for_quota(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.policy.min_spacing {
                let remaining = self.policy.min_spacing - elapsed;
                debug!(wait_ms = remaining.as_millis() as u64, "pacing remote call");
                sleep(remaining).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_the_first_retry() {
        let policy = GatePolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(4_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(8_000));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = GatePolicy {
            max_backoff: Duration::from_millis(5_000),
            ..GatePolicy::default()
        };
        assert_eq!(policy.backoff_for(3), Duration::from_millis(5_000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(5_000));
    }
}
