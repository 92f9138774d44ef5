use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide minimum spacing between outbound generation calls.
///
/// One instance is shared by every generation caller regardless of key, so
/// calls for different keys are serialized too.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request_at: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_at: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspends until a dispatch is allowed, then records it.
    ///
    /// The lock is held across the wait so queued callers are released one
    /// interval apart. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_request_at.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                waited = ready_at - now;
                tracing::debug!(wait_ms = waited.as_millis() as u64, "Throttling generation request");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
        waited
    }

    pub async fn last_request_at(&self) -> Option<Instant> {
        *self.last_request_at.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_secs(2));
        assert_eq!(throttle.acquire().await, Duration::ZERO);
        assert!(throttle.last_request_at().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_requests_are_spaced() {
        let throttle = Throttle::new(Duration::from_secs(2));

        throttle.acquire().await;
        let first = Instant::now();
        throttle.acquire().await;
        let second = Instant::now();

        assert!(second - first >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let throttle = Throttle::new(Duration::from_secs(2));
        throttle.acquire().await;

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(throttle.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(2)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let throttle = throttle.clone();
                tokio::spawn(async move {
                    throttle.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap() - start);
        }
        stamps.sort();

        assert_eq!(stamps[0], Duration::ZERO);
        assert!(stamps[1] >= Duration::from_secs(2));
        assert!(stamps[2] >= Duration::from_secs(4));
    }
}
