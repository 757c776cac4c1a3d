//! Overall timeout for the archive build.
//!
//! Builds can legitimately run for many minutes, so there is no timeout
//! unless one is configured. When it fires, the capture loop terminates the
//! child and reports the build as cancelled with reason `TIMEOUT`.

use std::time::{Duration, Instant};

/// Upper bound accepted for `timeout_seconds` (24 hours)
pub const MAX_TIMEOUT_SECONDS: u64 = 86400;

/// Timeout configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum wall-clock time for the build; `None` waits indefinitely
    pub overall_seconds: Option<u64>,
}

impl TimeoutConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn overall(seconds: u64) -> Self {
        Self {
            overall_seconds: Some(seconds),
        }
    }

    /// Validate bounds: when set, must be in (0, 86400]
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        match self.overall_seconds {
            Some(value) if value == 0 || value > MAX_TIMEOUT_SECONDS => {
                Err(TimeoutValidationError::OverallOutOfBounds { value })
            }
            _ => Ok(()),
        }
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("timeout_seconds must be in (0, 86400], got {value}")]
    OverallOutOfBounds { value: u64 },
}

/// Timeout check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    Ok,
    OverallTimeout,
}

impl TimeoutStatus {
    pub fn is_timeout(&self) -> bool {
        !matches!(self, TimeoutStatus::Ok)
    }
}

/// Tracks elapsed wall-clock time for one build.
///
/// Only reports; terminating the child is the caller's job.
#[derive(Debug)]
pub struct TimeoutEnforcer {
    config: TimeoutConfig,
    start_time: Instant,
}

impl TimeoutEnforcer {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub fn check(&self) -> TimeoutStatus {
        match self.config.overall_seconds {
            Some(limit) if self.elapsed() > Duration::from_secs(limit) => {
                TimeoutStatus::OverallTimeout
            }
            _ => TimeoutStatus::Ok,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Remaining time before the timeout, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.config
            .overall_seconds
            .map(|limit| Duration::from_secs(limit).saturating_sub(self.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_default_is_unbounded() {
        let config = TimeoutConfig::default();
        assert_eq!(config.overall_seconds, None);
        assert!(config.validate().is_ok());
        assert_eq!(TimeoutEnforcer::new(config).remaining(), None);
    }

    #[test]
    fn test_validation_bounds() {
        assert!(TimeoutConfig::overall(1).validate().is_ok());
        assert!(TimeoutConfig::overall(86400).validate().is_ok());
        assert!(matches!(
            TimeoutConfig::overall(0).validate(),
            Err(TimeoutValidationError::OverallOutOfBounds { value: 0 })
        ));
        assert!(matches!(
            TimeoutConfig::overall(86401).validate(),
            Err(TimeoutValidationError::OverallOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_enforcer_no_timeout() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::overall(10));
        assert_eq!(enforcer.check(), TimeoutStatus::Ok);
        assert!(enforcer.remaining().unwrap() <= Duration::from_secs(10));
    }

    #[test]
    fn test_enforcer_times_out() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::overall(1));
        sleep(Duration::from_millis(1100));
        assert_eq!(enforcer.check(), TimeoutStatus::OverallTimeout);
        assert!(enforcer.check().is_timeout());
        assert_eq!(enforcer.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_unbounded_never_times_out() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::none());
        sleep(Duration::from_millis(20));
        assert_eq!(enforcer.check(), TimeoutStatus::Ok);
    }
}
