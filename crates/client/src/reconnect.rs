use std::time::Duration;

use huddle_shared::constants::{WS_RECONNECT_BASE_DELAY_MS, WS_RECONNECT_MAX_DELAY_MS};

/// Exponential backoff for re-establishing a dropped live connection.
///
/// Without a policy a failed connection stays `Errored`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Extra random delay as a fraction of the computed delay (0.0 to 1.0).
    pub jitter: f64,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::from_millis(WS_RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(WS_RECONNECT_MAX_DELAY_MS),
            max_attempts,
            jitter: 0.2,
        }
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Whether the `attempt`th reconnect (1-based) may be made.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before the `attempt`th reconnect (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(16);
        let delay = base.saturating_mul(1u64 << exp).min(max);

        let jitter = (delay as f64 * self.jitter * rand::random::<f64>()) as u64;
        Duration::from_millis((delay + jitter).min(max))
    }
}
