//! Configuration for the load generator and the whole verification run.

use std::fmt;
use std::time::Duration;

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Worker count must be > 0.
    InvalidWorkers(usize),
    /// Target operation count must be > 0.
    InvalidMaxOps(u64),
    /// The sending window must be > 0.
    InvalidSendWindow,
    /// The tracked key must be non-empty.
    EmptyKey,
    /// The fast-checker key must differ from the tracked key.
    FastCheckKeyCollision(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidWorkers(n) => {
                write!(f, "invalid worker count: {} (must be > 0)", n)
            }
            ConfigError::InvalidMaxOps(n) => {
                write!(f, "invalid operation count: {} (must be > 0)", n)
            }
            ConfigError::InvalidSendWindow => {
                write!(f, "invalid sending window (must be > 0)")
            }
            ConfigError::EmptyKey => {
                write!(f, "tracked key must be non-empty")
            }
            ConfigError::FastCheckKeyCollision(key) => {
                write!(
                    f,
                    "fast-checker key '{}' must be disjoint from the tracked key",
                    key
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the load-generation phase.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Number of concurrent worker threads.
    pub workers: usize,
    /// Target number of operation attempts across all workers.
    pub max_ops: u64,
    /// Wall-clock budget of the sending phase; whichever of count and window
    /// is exhausted first stops the workers.
    pub send_window: Duration,
    /// Budget for the initial write/poll-read that fixes the starting state.
    pub setup_timeout: Duration,
    /// The single tracked key all workers hammer.
    pub key: String,
    /// Seed for the per-worker RNGs; `None` draws one from entropy.
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            workers: (num_cpus::get() * 8).max(8),
            max_ops: 100_000,
            send_window: Duration::from_secs(10),
            setup_timeout: Duration::from_secs(12),
            key: "test".to_string(),
            seed: None,
        }
    }
}

impl WorkloadConfig {
    /// Validate field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }
        if self.max_ops == 0 {
            return Err(ConfigError::InvalidMaxOps(self.max_ops));
        }
        if self.send_window.is_zero() {
            return Err(ConfigError::InvalidSendWindow);
        }
        if self.key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        Ok(())
    }
}

/// Configuration for a whole verification run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Load-generation settings.
    pub workload: WorkloadConfig,
    /// Whether to race the fast checker against the analyst.
    pub fast_check: bool,
    /// Auxiliary key for the fast checker; must be disjoint from the tracked
    /// key.
    pub fast_check_key: String,
    /// Ceiling on total run time, enforced by the watchdog.
    pub program_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workload: WorkloadConfig::default(),
            fast_check: true,
            fast_check_key: "fastcheck".to_string(),
            program_timeout: Duration::from_secs(120),
        }
    }
}

impl RunConfig {
    /// Validate field ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.workload.validate()?;
        if self.fast_check && self.fast_check_key == self.workload.key {
            return Err(ConfigError::FastCheckKeyCollision(
                self.fast_check_key.clone(),
            ));
        }
        Ok(())
    }
}
