//! Concurrent execution of the detector set
//!
//! Every detector runs on the rayon pool with its own budget. A detector that
//! errors, times out or panics becomes a failed section; the others still
//! report. Section order always matches detector registration order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    AnomalyDetectionResult, BenfordAnalysisResult, BenfordDetector, Budget, Detector, DetectorError,
    DuplicatePaymentDetector, RoundDollarDetector, UnusualTimingDetector,
};
use crate::config::EngineConfig;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Completed,
    Failed,
}

/// Outcome of one section of a comprehensive analysis
#[derive(Debug, Clone, Serialize)]
pub struct SectionOutcome {
    pub section: String,
    pub status: SectionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<AnomalyDetectionResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub benford: Vec<BenfordAnalysisResult>,
    /// Number of records the section wrote, when it writes any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_saved: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl SectionOutcome {
    pub fn completed(section: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            section: section.into(),
            status: SectionStatus::Completed,
            anomalies: Vec::new(),
            benford: Vec::new(),
            records_saved: None,
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(section: impl Into<String>, error: impl ToString, elapsed: Duration) -> Self {
        Self {
            section: section.into(),
            status: SectionStatus::Failed,
            anomalies: Vec::new(),
            benford: Vec::new(),
            records_saved: None,
            error: Some(error.to_string()),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Mark a completed section as failed, keeping what it found
    pub fn fail(&mut self, error: impl ToString) {
        self.status = SectionStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn is_completed(&self) -> bool {
        self.status == SectionStatus::Completed
    }
}

/// Per-section results of running every analysis over an investigation
#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveAnalysis {
    pub investigation_id: String,
    pub transaction_count: usize,
    pub sections: Vec<SectionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ComprehensiveAnalysis {
    pub fn is_complete(&self) -> bool {
        self.sections.iter().all(SectionOutcome::is_completed)
    }

    pub fn failed_sections(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| !s.is_completed())
            .map(|s| s.section.as_str())
            .collect()
    }

    pub fn section(&self, name: &str) -> Option<&SectionOutcome> {
        self.sections.iter().find(|s| s.section == name)
    }

    pub fn anomaly_count(&self) -> usize {
        self.sections.iter().map(|s| s.anomalies.len()).sum()
    }
}

pub struct AnalysisRunner {
    detectors: Vec<Box<dyn Detector>>,
    budget: Duration,
}

impl AnalysisRunner {
    /// The standard detector set, configured from `config`
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            detectors: vec![
                Box::new(DuplicatePaymentDetector),
                Box::new(UnusualTimingDetector::new(&config.detectors)),
                Box::new(RoundDollarDetector::new(&config.detectors)),
                Box::new(BenfordDetector::new(config.benford.clone())),
            ],
            budget: Duration::from_millis(config.detectors.budget_ms),
        }
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>, budget: Duration) -> Self {
        Self { detectors, budget }
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run every detector over the same snapshot
    pub fn run(&self, transactions: &[Transaction]) -> Vec<SectionOutcome> {
        self.detectors
            .par_iter()
            .map(|detector| self.run_one(detector.as_ref(), transactions))
            .collect()
    }

    fn run_one(&self, detector: &dyn Detector, transactions: &[Transaction]) -> SectionOutcome {
        let name = detector.name();
        let started = Instant::now();
        let budget = Budget::new(self.budget);

        let result = catch_unwind(AssertUnwindSafe(|| detector.detect(transactions, &budget)))
            .unwrap_or_else(|_| {
                Err(DetectorError::Failed {
                    detector: name.to_string(),
                    reason: "detector panicked".to_string(),
                })
            });

        match result {
            Ok(report) => {
                debug!(
                    detector = name,
                    anomalies = report.anomalies.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Detector completed"
                );
                let mut outcome = SectionOutcome::completed(name, started.elapsed());
                outcome.anomalies = report.anomalies;
                outcome.benford = report.digits;
                outcome
            }
            Err(e) => {
                warn!(detector = name, error = %e, "Detector failed");
                SectionOutcome::failed(name, e, started.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorReport;
    use crate::transaction::TransactionKind;
    use rust_decimal_macros::dec;

    struct Exploding;

    impl Detector for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn detect(&self, _: &[Transaction], _: &Budget) -> Result<DetectorReport, DetectorError> {
            Err(DetectorError::Failed {
                detector: "exploding".to_string(),
                reason: "source offline".to_string(),
            })
        }
    }

    struct Panicking;

    impl Detector for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn detect(&self, _: &[Transaction], _: &Budget) -> Result<DetectorReport, DetectorError> {
            panic!("boom")
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            Transaction::new("a", dec!(1500), TransactionKind::Expense).with_description("Invoice 12"),
            Transaction::new("b", dec!(1500), TransactionKind::Expense).with_description("Invoice 12"),
        ]
    }

    #[test]
    fn test_default_runner_sections_in_order() {
        let runner = AnalysisRunner::new(&EngineConfig::default());
        let sections = runner.run(&sample());
        let names: Vec<_> = sections.iter().map(|s| s.section.as_str()).collect();
        assert_eq!(names, vec!["duplicate_payments", "unusual_timing", "round_dollar", "benford"]);
        assert!(sections.iter().all(SectionOutcome::is_completed));
        assert_eq!(sections[0].anomalies.len(), 1);
    }

    #[test]
    fn test_failure_is_isolated() {
        let runner = AnalysisRunner::with_detectors(
            vec![Box::new(Exploding), Box::new(DuplicatePaymentDetector), Box::new(Panicking)],
            Duration::from_secs(5),
        );
        let sections = runner.run(&sample());
        assert_eq!(sections[0].status, SectionStatus::Failed);
        assert!(sections[0].error.as_deref().unwrap().contains("source offline"));
        assert!(sections[1].is_completed());
        assert_eq!(sections[1].anomalies.len(), 1);
        assert_eq!(sections[2].status, SectionStatus::Failed);
    }

    #[test]
    fn test_zero_budget_fails_every_detector() {
        let mut config = EngineConfig::default();
        config.detectors.budget_ms = 0;
        let sections = AnalysisRunner::new(&config).run(&sample());
        assert!(sections.iter().all(|s| s.status == SectionStatus::Failed));
    }
}
