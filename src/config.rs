//! Session configuration
//!
//! Single source of truth for every tuneable constant in the streaming
//! pipeline. Behaviour is changed here, not by scattering magic numbers
//! across the capture and channel modules.

use std::time::Duration;

use rand::Rng;

/// Default interval between capture attempts (2 fps)
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum supported capture interval
///
/// Requests below this are clamped: phone camera stacks rarely deliver a
/// still capture faster than this, and the inference backend drops
/// oversupplied frames anyway.
pub const MIN_CAPTURE_INTERVAL: Duration = Duration::from_millis(250);

/// Maximum raw frame size accepted by the encoder (2 MiB)
///
/// Matches the backend's per-message WebSocket limit. A full-resolution
/// phone JPEG fits comfortably; anything larger is a capture gone wrong.
pub const MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;

/// Configuration for a streaming session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the inference backend
    pub server_url: String,
    /// Interval between capture attempts
    pub capture_interval: Duration,
    /// Reconnect behaviour after an unexpected disconnect
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8000/ws/predict".to_string(),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create a config for the given backend URL with defaults elsewhere
    pub fn for_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Capture interval clamped to the supported minimum
    pub fn effective_interval(&self) -> Duration {
        self.capture_interval.max(MIN_CAPTURE_INTERVAL)
    }
}

/// Bounded, jittered exponential backoff for channel reconnects
///
/// The channel retries a dropped connection at most `max_attempts` times,
/// doubling the delay each attempt from `base_delay` up to `max_delay`,
/// with ±25% jitter so a fleet of clients does not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Jittered delay before the given attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        exp.mul_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.capture_interval, DEFAULT_CAPTURE_INTERVAL);
        assert!(config.server_url.starts_with("ws://"));
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let config = SessionConfig {
            capture_interval: Duration::from_millis(50),
            ..Default::default()
        };
        assert_eq!(config.effective_interval(), MIN_CAPTURE_INTERVAL);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = ReconnectPolicy::default();
        for attempt in 0..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay <= policy.max_delay.mul_f64(1.25));
            assert!(delay >= policy.base_delay.mul_f64(0.75));
        }
    }

    #[test]
    fn test_backoff_grows() {
        let policy = ReconnectPolicy::default();
        // Upper bound of attempt 0 is below the lower bound of attempt 2
        assert!(policy.base_delay.mul_f64(1.25) < policy.base_delay.mul_f64(4.0 * 0.75));
        let _ = policy.delay_for(0);
        let _ = policy.delay_for(2);
    }

    #[test]
    fn test_disabled_policy() {
        assert_eq!(ReconnectPolicy::disabled().max_attempts, 0);
    }
}
