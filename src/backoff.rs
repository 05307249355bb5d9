//! Reconnect delay schedule.

use crate::error::{RealtimeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempts beyond this are clamped before exponentiation.
const MAX_EXPONENT: u32 = 1024;

/// Capped exponential backoff: `min(base * growth^attempt, cap)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub growth_factor: f64,
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: u64, growth_factor: f64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            growth_factor,
            max_delay_ms,
        }
    }

    /// Delay before reconnect attempt number `attempt`.
    ///
    /// The attempt counter is incremented before this is consulted, so the
    /// first reconnect after a drop uses `attempt == 1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_EXPONENT) as i32;
        let raw = self.base_delay_ms as f64 * self.growth_factor.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(RealtimeError::InvalidConfig(
                "backoff base_delay_ms must be positive".to_string(),
            ));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(RealtimeError::InvalidConfig(format!(
                "backoff growth_factor must be >= 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(RealtimeError::InvalidConfig(format!(
                "backoff max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(2_000, 1.5, 30_000)
    }
}
