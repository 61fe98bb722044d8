// =============================================================================
// Reconnect Policy — delay between connection attempts
// =============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Decides how long the ingest stage waits before reconnecting.
pub trait ReconnectPolicy: Send {
    /// Delay before the next attempt.  Each call counts as one failure.
    fn next_delay(&mut self) -> Duration;

    /// Forget previous failures after a connection was established.
    fn reset(&mut self);
}

/// Same delay after every failure.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectPolicy for FixedBackoff {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}
}

/// `base * 2^(failures-1)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let pow = (self.failures - 1).min(31);
        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let max_ms = self.max.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(base_ms.saturating_mul(1u64 << pow).min(max_ms))
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Which policy the configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

impl BackoffStrategy {
    pub fn build(self, base: Duration, max: Duration) -> Box<dyn ReconnectPolicy> {
        match self {
            Self::Fixed => Box::new(FixedBackoff::new(base)),
            Self::Exponential => Box::new(ExponentialBackoff::new(base, max)),
        }
    }
}
