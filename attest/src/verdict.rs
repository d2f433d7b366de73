//! Verdicts, violations, and the run-level error taxonomy.
//!
//! Every run ends in exactly one of four user-visible outcomes, each with a
//! distinct process exit status: no violation found within the tested budget,
//! violation detected, fatal setup error, or an inconclusive internal error.

use std::fmt;
use std::time::Duration;

use crate::analyst::AnalysisReport;
use crate::config::ConfigError;
use crate::record::OpRecord;
use crate::store::StoreError;

/// Exit status for a run that found no violation within its budget.
pub const EXIT_NO_VIOLATION: i32 = 0;
/// Exit status for a confirmed consistency violation.
pub const EXIT_VIOLATION: i32 = 1;
/// Exit status for a fatal setup failure (the initial write/read never
/// succeeded).
pub const EXIT_SETUP_FAILURE: i32 = 2;
/// Exit status for an inconclusive run: an internal error, not a statement
/// about the store.
pub const EXIT_INCONCLUSIVE: i32 = 3;

/// A confirmed proof that the recorded history is not atomic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A read observed a value no recorded write produced.
    MissingDictator {
        /// The orphaned value.
        value: String,
        /// The read that observed it.
        read: OpRecord,
    },
    /// The precedence graph has a cycle: no total order can satisfy every
    /// recorded constraint.
    Cycle {
        /// Tail of the back edge that closed the cycle.
        from: OpRecord,
        /// Head of the back edge.
        to: OpRecord,
    },
    /// The fast checker's read did not observe its own immediately preceding
    /// write on an otherwise untouched key.
    StaleRead {
        /// The probe key.
        key: String,
        /// The value just written.
        expected: String,
        /// The value actually observed, if any.
        observed: Option<String>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingDictator { value, read } => {
                write!(f, "read {} observed value '{}' that was never written", read, value)
            }
            Violation::Cycle { from, to } => {
                write!(f, "precedence cycle: {} must precede {} and vice versa", to, from)
            }
            Violation::StaleRead {
                key,
                expected,
                observed,
            } => match observed {
                Some(observed) => write!(
                    f,
                    "stale read on key '{}': wrote '{}', observed '{}'",
                    key, expected, observed
                ),
                None => write!(
                    f,
                    "stale read on key '{}': wrote '{}', key then reported missing",
                    key, expected
                ),
            },
        }
    }
}

/// Final outcome of one verification run.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// No inconsistency found within the tested budget. A statement about the
    /// sample, not a proof of correctness.
    Consistent(AnalysisReport),
    /// The store is provably non-atomic.
    Inconsistent(Violation),
}

impl Verdict {
    /// Process exit status for this verdict.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Consistent(_) => EXIT_NO_VIOLATION,
            Verdict::Inconsistent(_) => EXIT_VIOLATION,
        }
    }

    /// Whether a violation was found.
    pub fn is_violation(&self) -> bool {
        matches!(self, Verdict::Inconsistent(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Consistent(_) => write!(f, "no violation found within budget"),
            Verdict::Inconsistent(violation) => write!(f, "violation detected: {}", violation),
        }
    }
}

/// Result of a whole run, verdict plus advisory numbers.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The verdict.
    pub verdict: Verdict,
    /// Operation records collected by the load generator (including the
    /// synthetic initial write).
    pub operations: usize,
    /// Total wall time of the run.
    pub elapsed: Duration,
}

/// A run that could not produce a verdict.
#[derive(Debug)]
pub enum RunError {
    /// The configuration failed validation.
    Config(ConfigError),
    /// The mandatory initialization write/read never succeeded; the run
    /// cannot proceed without a known initial state.
    Setup(StoreError),
    /// Internal failure (a worker panicked, a thread could not be joined).
    /// Inconclusive: says nothing about the store.
    Internal(String),
}

impl RunError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) | RunError::Internal(_) => EXIT_INCONCLUSIVE,
            RunError::Setup(_) => EXIT_SETUP_FAILURE,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Config(err) => write!(f, "configuration error: {}", err),
            RunError::Setup(err) => write!(f, "failed to set up initial value: {}", err),
            RunError::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for RunError {}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_outcome() {
        let violation = Verdict::Inconsistent(Violation::StaleRead {
            key: "probe".to_string(),
            expected: "1".to_string(),
            observed: None,
        });
        assert_eq!(violation.exit_code(), EXIT_VIOLATION);
        assert_eq!(
            RunError::Setup(StoreError::transport("refused")).exit_code(),
            EXIT_SETUP_FAILURE
        );
        assert_eq!(
            RunError::Internal("panicked".to_string()).exit_code(),
            EXIT_INCONCLUSIVE
        );
    }

    #[test]
    fn test_violation_display_names_the_operations() {
        let violation = Violation::MissingDictator {
            value: "7".to_string(),
            read: OpRecord::read(3, 9, "7"),
        };
        let text = violation.to_string();
        assert!(text.contains("[3-9]R(7)"));
        assert!(text.contains("never written"));
    }
}
