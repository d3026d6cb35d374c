use std::time::Duration;
use tokio::time::sleep;

/// Doubling delay between resubscription attempts, capped at `max_delay`
///
/// Feeds live for the whole process, so there is no retry limit.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            current_attempt: 0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let factor = 2_u32.saturating_pow(self.current_attempt.min(16));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    pub async fn sleep(&mut self) {
        let delay = self.next_delay();
        log::warn!("⏳ Retry attempt {} in {}s", self.current_attempt + 1, delay.as_secs());

        sleep(delay).await;
        self.current_attempt = self.current_attempt.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
