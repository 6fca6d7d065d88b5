//! Recovery configuration.

use std::time::Duration;

/// How recovery passes are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// A background thread runs a pass every scan interval.
    #[default]
    Automatic,
    /// Passes run only when the application asks for one.
    Manual,
}

/// Configuration for the recovery subsystem.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Automatic or manual recovery.
    pub mode: RecoveryMode,

    /// Time between the end of one automatic pass and the start of the next.
    pub scan_interval: Duration,

    /// Pause between the two scans of a pass.
    ///
    /// Only branches reported by both scans are resolved, so branches that
    /// are merely slow to complete are left alone.
    pub backoff_period: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            mode: RecoveryMode::Automatic,
            scan_interval: Duration::from_secs(120),
            backoff_period: Duration::from_secs(10),
        }
    }
}

impl RecoveryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the recovery mode.
    #[must_use]
    pub const fn mode(mut self, mode: RecoveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the scan interval.
    #[must_use]
    pub const fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Sets the backoff period between the two scans of a pass.
    #[must_use]
    pub const fn backoff_period(mut self, period: Duration) -> Self {
        self.backoff_period = period;
        self
    }
}
