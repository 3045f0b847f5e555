//! Per-source politeness gate

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

struct Slot {
    interval: Duration,
    // tokio's mutex queues waiters in arrival order
    last_grant: tokio::sync::Mutex<Option<Instant>>,
}

/// Enforces a minimum interval between grants for each source.
///
/// Sources are independent: a slow source never delays another one. Callers
/// waiting on the same source are served first-come first-served, and the
/// slot stays locked while a waiter sleeps, so at most one grant is issued per
/// interval window.
pub struct RateLimiter {
    default_interval: Duration,
    intervals: Mutex<HashMap<String, Duration>>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl RateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            intervals: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Set the rate for a source. Takes effect for slots created afterwards,
    /// so configure sources before the first `acquire`.
    pub fn set_rate(&self, source_id: &str, requests_per_second: f64) {
        let interval = interval_for(requests_per_second);
        self.intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_id.to_string(), interval);
    }

    pub fn min_interval(&self, source_id: &str) -> Duration {
        self.intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .copied()
            .unwrap_or(self.default_interval)
    }

    fn slot(&self, source_id: &str) -> Arc<Slot> {
        let interval = self.min_interval(source_id);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(source_id.to_string())
            .or_insert_with(|| {
                Arc::new(Slot {
                    interval,
                    last_grant: tokio::sync::Mutex::new(None),
                })
            })
            .clone()
    }

    /// Wait for this source's next grant. Returns the grant instant.
    pub async fn acquire(
        &self,
        source_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Instant, Cancelled> {
        let slot = self.slot(source_id);

        let mut last_grant = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            guard = slot.last_grant.lock() => guard,
        };

        if let Some(previous) = *last_grant {
            let ready_at = previous + slot.interval;
            if ready_at > Instant::now() {
                debug!(
                    source = source_id,
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Rate limit wait"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Cancelled),
                    _ = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }

        let granted = Instant::now();
        *last_grant = Some(granted);
        Ok(granted)
    }
}

/// Convert requests-per-second into a minimum interval. Non-positive rates
/// fall back to one request per second.
pub fn interval_for(requests_per_second: f64) -> Duration {
    if requests_per_second.is_finite() && requests_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / requests_per_second)
    } else {
        Duration::from_secs(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_for_rate() {
        assert_eq!(interval_for(0.5), Duration::from_secs(2));
        assert_eq!(interval_for(4.0), Duration::from_millis(250));
        assert_eq!(interval_for(0.0), Duration::from_secs(1));
    }

    #[test]
    fn test_min_interval_defaults() {
        let limiter = RateLimiter::new(Duration::from_secs(3));
        limiter.set_rate("mangadex", 0.5);
        assert_eq!(limiter.min_interval("mangadex"), Duration::from_secs(2));
        assert_eq!(limiter.min_interval("unknown"), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_grants_are_spaced_and_fifo() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
        limiter.set_rate("site", 0.5);
        let cancel = CancellationToken::new();
        let grants = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            let grants = grants.clone();
            handles.push(tokio::spawn(async move {
                let at = limiter.acquire("site", &cancel).await.unwrap();
                grants.lock().unwrap().push((i, at));
            }));
            // let each task reach the slot before spawning the next
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let grants = grants.lock().unwrap();
        let order: Vec<usize> = grants.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in grants.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let cancel = CancellationToken::new();

        let a1 = limiter.acquire("a", &cancel).await.unwrap();
        let b1 = limiter.acquire("b", &cancel).await.unwrap();
        assert_eq!(a1, b1);

        let a2 = limiter.acquire("a", &cancel).await.unwrap();
        assert!(a2 - a1 >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_wait() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        limiter.acquire("site", &cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire("site", &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    }
}
