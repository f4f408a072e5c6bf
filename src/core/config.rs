//! Scheduler configuration with documented constants
//!
//! All tunable values are collected here with explanations of their purpose
//! and how they interact with each other. The config is injected into the
//! schedulers at construction; nothing reads it through global state.

use std::time::Duration;

use serde::Serialize;

use crate::core::error::{Result, SchedError};

/// Configuration for the scheduling subsystem
///
/// Defaults target a 60 updates/sec loop. Changing them shifts when slow
/// systems get flagged and how chatty the diagnostic output is.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerConfig {
    // === FRAME BUDGET ===
    /// Wall-clock budget for one full tick+render cycle
    ///
    /// At 60 updates/sec this is ~16.7ms. Used only as the baseline for
    /// slow-system detection; nothing enforces it.
    pub target_frame_time: Duration,

    /// Fraction of the frame budget one system may consume before it is
    /// flagged as slow
    ///
    /// At 0.5 with a 16.7ms budget, any single system over ~8.3ms draws a
    /// warning. Detection is feedback, not enforcement: a slow system still
    /// runs to completion and stalls its stage.
    pub slow_system_fraction: f32,

    // === DIAGNOSTICS ===
    /// Minimum number of frames between slow-system warnings for the same
    /// system
    ///
    /// A system that is slow every frame would otherwise emit one warning
    /// per frame. At 120 frames (~2 seconds at 60fps) the log stays useful.
    pub warn_cooldown_frames: u64,

    /// Number of ticks between periodic performance summary dumps
    ///
    /// At 600 ticks (~10 seconds at 60fps) the summary is frequent enough
    /// to catch drift without drowning the log.
    pub summary_interval_ticks: u64,

    // === PARALLELIZATION ===
    /// Minimum entity count before the entity executor goes parallel
    ///
    /// Below this threshold, thread overhead exceeds benefits. At 1000 we
    /// only fan out when there is enough work to justify the
    /// synchronization cost.
    pub parallel_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // 16.7ms = 60 updates/sec
            target_frame_time: Duration::from_micros(16_700),
            slow_system_fraction: 0.5,

            // Diagnostics cadence
            warn_cooldown_frames: 120,
            summary_interval_ticks: 600,

            // Parallelization
            parallel_threshold: 1000,
        }
    }
}

impl SchedulerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.target_frame_time.is_zero() {
            return Err(SchedError::InvalidConfig(
                "target_frame_time must be positive".into(),
            ));
        }

        if self.slow_system_fraction <= 0.0 || self.slow_system_fraction > 1.0 {
            return Err(SchedError::InvalidConfig(format!(
                "slow_system_fraction ({}) must be in (0.0, 1.0]",
                self.slow_system_fraction
            )));
        }

        if self.summary_interval_ticks == 0 {
            return Err(SchedError::InvalidConfig(
                "summary_interval_ticks must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Elapsed time above which a single system counts as slow
    pub fn slow_system_threshold(&self) -> Duration {
        self.target_frame_time.mul_f32(self.slow_system_fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_slow_threshold_derivation() {
        let config = SchedulerConfig {
            target_frame_time: Duration::from_millis(20),
            slow_system_fraction: 0.5,
            ..Default::default()
        };
        assert_eq!(config.slow_system_threshold(), Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let config = SchedulerConfig {
            slow_system_fraction: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            slow_system_fraction: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_summary_interval_rejected() {
        let config = SchedulerConfig {
            summary_interval_ticks: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
