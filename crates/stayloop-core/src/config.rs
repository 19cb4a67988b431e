use std::time::Duration;

use crate::constants::{
    DEGRADED_POLL_INTERVAL_MS, RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS,
    TYPING_EXPIRY_MS,
};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Resettable deadline for the typing indicator.
    pub typing_expiry: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Failed reconnects tolerated before degrading to polling.
    pub reconnect_attempts: u32,
    pub degraded_poll_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            typing_expiry: Duration::from_millis(TYPING_EXPIRY_MS),
            reconnect_base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            reconnect_attempts: RECONNECT_ATTEMPTS,
            degraded_poll_interval: Duration::from_millis(DEGRADED_POLL_INTERVAL_MS),
        }
    }
}

impl CoreConfig {
    /// Delay before reconnect attempt `attempt` (1-based), exponential
    /// with a cap.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let delay = self.reconnect_base_delay.saturating_mul(factor);
        delay.min(self.reconnect_max_delay)
    }
}
