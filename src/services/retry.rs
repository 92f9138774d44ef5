use std::time::Duration;

/// Retry budget for one generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `retry` (1-based): `base * 2^(retry - 1)`,
    /// i.e. 2s, 4s, 8s with the default 2s base.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Sum of every backoff the policy can impose
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries).map(|retry| self.delay_for(retry)).sum()
    }
}

/// Attempt bookkeeping for a single call; never persisted
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    pub attempt: u32,
    policy: RetryPolicy,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { attempt: 0, policy }
    }

    /// Marks the start of the next attempt
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Backoff to wait before another attempt, or `None` when the budget is spent
    pub fn next_delay(&self) -> Option<Duration> {
        if self.attempt > self.policy.max_retries {
            return None;
        }
        Some(self.policy.delay_for(self.attempt))
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.total_backoff(), Duration::from_secs(14));
    }

    #[test]
    fn test_retry_state_exhausts_budget() {
        let mut state = RetryState::new(RetryPolicy::default());
        let mut delays = Vec::new();

        loop {
            state.begin_attempt();
            match state.next_delay() {
                Some(delay) => delays.push(delay),
                None => break,
            }
        }

        assert_eq!(state.attempt, 4);
        assert_eq!(state.max_attempts(), 4);
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_zero_retries() {
        let mut state = RetryState::new(RetryPolicy::new(0, Duration::from_secs(2)));
        state.begin_attempt();
        assert_eq!(state.next_delay(), None);
    }
}
