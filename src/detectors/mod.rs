//! Batch anomaly detectors
//!
//! Each detector is a pure function over the full transaction snapshot of an
//! investigation. Detectors share no state, so the [`runner`] can execute them
//! concurrently; each one gets its own [`Budget`] and fails on its own.
//!
//! | Detector | Anomaly type | Severity |
//! |---|---|---|
//! | [`DuplicatePaymentDetector`] | `duplicate_payment` | high |
//! | [`UnusualTimingDetector`] | `unusual_timing` | medium |
//! | [`RoundDollarDetector`] | `round_dollar` | medium |
//! | [`BenfordDetector`] | `benford_violation` | high |

pub mod benford;
pub mod duplicate;
pub mod round_dollar;
pub mod runner;
pub mod timing;
pub mod types;

pub use benford::{analyze_benfords_law, leading_digit, BenfordDetector};
pub use duplicate::DuplicatePaymentDetector;
pub use round_dollar::RoundDollarDetector;
pub use runner::{AnalysisRunner, ComprehensiveAnalysis, SectionOutcome, SectionStatus};
pub use timing::UnusualTimingDetector;
pub use types::*;

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::transaction::Transaction;

/// How many items a detector processes between budget checks
pub(crate) const BUDGET_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    #[error("{detector} exceeded its {limit_ms} ms budget")]
    BudgetExceeded { detector: String, limit_ms: u128 },

    #[error("{detector} failed: {reason}")]
    Failed { detector: String, reason: String },
}

/// Wall-clock allowance for one detector run, checked cooperatively
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    limit: Option<Duration>,
}

impl Budget {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self, detector: &str) -> Result<(), DetectorError> {
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => Err(DetectorError::BudgetExceeded {
                detector: detector.to_string(),
                limit_ms: limit.as_millis(),
            }),
            _ => Ok(()),
        }
    }

    /// Check only every [`BUDGET_CHECK_INTERVAL`] items
    pub(crate) fn check_at(&self, index: usize, detector: &str) -> Result<(), DetectorError> {
        if index % BUDGET_CHECK_INTERVAL == 0 {
            self.check(detector)
        } else {
            Ok(())
        }
    }
}

pub trait Detector: Send + Sync {
    /// Stable section name, used in runner output and logs
    fn name(&self) -> &'static str;

    fn detect(&self, transactions: &[Transaction], budget: &Budget) -> Result<DetectorReport, DetectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_exhausted_immediately() {
        let budget = Budget::new(Duration::ZERO);
        let err = budget.check("duplicate_payments").unwrap_err();
        assert!(matches!(err, DetectorError::BudgetExceeded { .. }));
    }

    #[test]
    fn test_unlimited_budget_never_expires() {
        assert!(Budget::unlimited().check("any").is_ok());
    }

    #[test]
    fn test_check_at_skips_between_intervals() {
        let budget = Budget::new(Duration::ZERO);
        assert!(budget.check_at(1, "any").is_ok());
        assert!(budget.check_at(BUDGET_CHECK_INTERVAL, "any").is_err());
    }
}
