//! Benford's Law first-digit analysis
//!
//! The leading significant digit of each absolute amount is tallied and
//! compared against the logarithmic reference distribution. Amounts whose
//! absolute value is below 1 have no integer leading digit and are left out;
//! an input with no usable amounts yields an empty table.

use rust_decimal::Decimal;

use super::{
    AnomalyDetectionResult, AnomalyType, BenfordAnalysisResult, Budget, Detector, DetectorError, DetectorReport,
    Severity,
};
use crate::config::BenfordConfig;
use crate::transaction::Transaction;

const NAME: &str = "benford";

/// Leading digit (1..=9) of `|amount|`, or `None` when `|amount| < 1`
pub fn leading_digit(amount: Decimal) -> Option<u8> {
    let abs = amount.abs();
    if abs < Decimal::ONE {
        return None;
    }
    abs.trunc()
        .to_string()
        .bytes()
        .find(|b| b.is_ascii_digit() && *b != b'0')
        .map(|b| b - b'0')
}

/// Compare the first-digit distribution of `amounts` with the reference table
pub fn analyze_benfords_law(amounts: &[Decimal], config: &BenfordConfig) -> Vec<BenfordAnalysisResult> {
    let mut counts = [0usize; 9];
    for digit in amounts.iter().filter_map(|a| leading_digit(*a)) {
        counts[(digit - 1) as usize] += 1;
    }
    digit_table(&counts, config)
}

fn digit_table(counts: &[usize; 9], config: &BenfordConfig) -> Vec<BenfordAnalysisResult> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return Vec::new();
    }

    counts
        .iter()
        .zip(config.expected.iter())
        .enumerate()
        .map(|(i, (&count, &expected_pct))| {
            let observed_pct = count as f64 * 100.0 / total as f64;
            let expected_count = total as f64 * expected_pct / 100.0;
            let deviation = observed_pct - expected_pct;
            BenfordAnalysisResult {
                digit: (i + 1) as u8,
                observed_pct,
                expected_pct,
                deviation,
                chi_square: (count as f64 - expected_count).powi(2) / expected_count,
                passed: deviation.abs() <= config.tolerance_pct,
            }
        })
        .collect()
}

/// Sum of the per-digit chi-square contributions
pub fn total_chi_square(rows: &[BenfordAnalysisResult]) -> f64 {
    rows.iter().map(|r| r.chi_square).sum()
}

#[derive(Debug, Clone, Default)]
pub struct BenfordDetector {
    config: BenfordConfig,
}

impl BenfordDetector {
    pub fn new(config: BenfordConfig) -> Self {
        Self { config }
    }
}

impl Detector for BenfordDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, transactions: &[Transaction], budget: &Budget) -> Result<DetectorReport, DetectorError> {
        let mut counts = [0usize; 9];
        for (index, transaction) in transactions.iter().enumerate() {
            budget.check_at(index, NAME)?;
            if let Some(digit) = leading_digit(transaction.amount) {
                counts[(digit - 1) as usize] += 1;
            }
        }

        let digits = digit_table(&counts, &self.config);
        let failing: Vec<u8> = digits.iter().filter(|r| !r.passed).map(|r| r.digit).collect();

        let mut anomalies = Vec::new();
        if !digits.is_empty() && failing.len() >= self.config.failing_digits_trigger {
            let listed: Vec<String> = failing.iter().map(|d| d.to_string()).collect();
            anomalies.push(AnomalyDetectionResult {
                anomaly_type: AnomalyType::BenfordViolation,
                severity: Severity::High,
                description: format!(
                    "{} of 9 leading digits ({}) deviate more than {:.1} points from Benford's Law (chi-square {:.2})",
                    failing.len(),
                    listed.join(", "),
                    self.config.tolerance_pct,
                    total_chi_square(&digits)
                ),
                detection_method: "Benford's Law first-digit test".to_string(),
                affected_transactions: transactions.iter().map(|t| t.id.clone()).collect(),
            });
        }

        Ok(DetectorReport { anomalies, digits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionKind;
    use rust_decimal_macros::dec;

    /// Amounts whose leading digits follow the reference table closely
    fn conforming(n_per_thousand: usize) -> Vec<Decimal> {
        let counts = [301, 176, 125, 97, 79, 67, 58, 51, 46];
        let mut amounts = Vec::new();
        for (i, count) in counts.iter().enumerate() {
            for k in 0..(count * n_per_thousand) {
                let digit = Decimal::from(i as u64 + 1);
                amounts.push(digit * dec!(100) + Decimal::from(k as u64 % 100));
            }
        }
        amounts
    }

    #[test]
    fn test_leading_digit() {
        assert_eq!(leading_digit(dec!(4821.55)), Some(4));
        assert_eq!(leading_digit(dec!(-9.99)), Some(9));
        assert_eq!(leading_digit(dec!(1)), Some(1));
        assert_eq!(leading_digit(dec!(0.75)), None);
        assert_eq!(leading_digit(dec!(0)), None);
    }

    #[test]
    fn test_conforming_distribution_passes() {
        let rows = analyze_benfords_law(&conforming(1), &BenfordConfig::default());
        assert_eq!(rows.len(), 9);
        assert!(rows.iter().all(|r| r.passed));
        let observed: f64 = rows.iter().map(|r| r.observed_pct).sum();
        assert!((observed - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_distribution_fails_most_digits() {
        let amounts: Vec<Decimal> = (1..=9u64)
            .flat_map(|d| (0..100u64).map(move |k| Decimal::from(d * 1000 + k)))
            .collect();
        let rows = analyze_benfords_law(&amounts, &BenfordConfig::default());
        assert!(rows.iter().filter(|r| !r.passed).count() >= 3);
        // Uniform: every digit is observed at 11.1%
        assert!((rows[0].observed_pct - 100.0 / 9.0).abs() < 1e-9);
        assert!(rows[0].deviation < 0.0);
    }

    #[test]
    fn test_all_ones_fails_and_triggers() {
        let txs: Vec<Transaction> = (0..50u64)
            .map(|k| Transaction::new(format!("t{}", k), Decimal::from(100 + k), TransactionKind::Expense))
            .collect();
        let report = BenfordDetector::default().detect(&txs, &Budget::unlimited()).unwrap();
        assert!(!report.digits[0].passed);
        assert!((report.digits[0].observed_pct - 100.0).abs() < 1e-9);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].anomaly_type, AnomalyType::BenfordViolation);
    }

    #[test]
    fn test_small_amounts_are_excluded() {
        let rows = analyze_benfords_law(&[dec!(0.5), dec!(0.99), dec!(-0.01)], &BenfordConfig::default());
        assert!(rows.is_empty());
        assert!(analyze_benfords_law(&[], &BenfordConfig::default()).is_empty());
    }

    #[test]
    fn test_detector_flags_uniform_set_with_all_ids() {
        let txs: Vec<Transaction> = (1..=9u64)
            .flat_map(|d| (0..20u64).map(move |k| (d, k)))
            .map(|(d, k)| {
                Transaction::new(format!("t{}-{}", d, k), Decimal::from(d * 100 + k), TransactionKind::Expense)
            })
            .collect();
        let report = BenfordDetector::default().detect(&txs, &Budget::unlimited()).unwrap();
        assert_eq!(report.digits.len(), 9);
        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.anomaly_type, AnomalyType::BenfordViolation);
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.affected_transactions.len(), txs.len());
    }

    #[test]
    fn test_detector_quiet_on_conforming_set() {
        let txs: Vec<Transaction> = conforming(1)
            .into_iter()
            .enumerate()
            .map(|(i, a)| Transaction::new(format!("t{}", i), a, TransactionKind::Income))
            .collect();
        let report = BenfordDetector::default().detect(&txs, &Budget::unlimited()).unwrap();
        assert!(report.anomalies.is_empty());
    }
}
