//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    /// Margin added to a policy's maximum lifetime before the backstop
    /// timer forces a terminal state
    pub backstop_margin_secs: u64,
    /// Capacity of the exhaustion/internal-error alert channel
    pub alert_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            backstop_margin_secs: 60,
            alert_channel_capacity: 64,
        }
    }
}

/// Dispatch fan-out and retry configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum concurrent contacts per tier fan-out
    pub max_fanout: usize,
    /// Delivery deadline for a single channel attempt
    pub attempt_timeout_secs: u64,
    /// Grace period before the SMS shadow follow-up to a voice attempt
    pub voice_fallback_grace_secs: u64,
    /// Base delay for exponential retry backoff
    pub backoff_base_ms: u64,
    /// Cap on any single backoff delay
    pub backoff_cap_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_fanout: 8,
            attempt_timeout_secs: 15,
            voice_fallback_grace_secs: 10,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
        }
    }
}

impl DispatchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn voice_fallback_grace(&self) -> Duration {
        Duration::from_secs(self.voice_fallback_grace_secs)
    }

    /// Capped exponential backoff for the given retry (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = self.backoff_base_ms.saturating_mul(1u64 << retry.min(16));
        Duration::from_millis(exp.min(self.backoff_cap_ms))
    }
}
