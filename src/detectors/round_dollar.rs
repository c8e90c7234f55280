//! Round-dollar bias detection
//!
//! Fabricated entries tend to be whole-dollar amounts. When the share of
//! transactions with a whole-dollar absolute amount at or above the minimum
//! strictly exceeds the configured percentage, the set is flagged once.

use rust_decimal::Decimal;

use super::{AnomalyDetectionResult, AnomalyType, Budget, Detector, DetectorError, DetectorReport, Severity};
use crate::config::DetectorConfig;
use crate::transaction::Transaction;

const NAME: &str = "round_dollar";

#[derive(Debug, Clone)]
pub struct RoundDollarDetector {
    minimum: Decimal,
    ratio_pct: u32,
}

impl RoundDollarDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            minimum: config.round_dollar_minimum,
            ratio_pct: config.round_dollar_ratio_pct,
        }
    }
}

impl Default for RoundDollarDetector {
    fn default() -> Self {
        Self::new(&DetectorConfig::default())
    }
}

impl Detector for RoundDollarDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, transactions: &[Transaction], budget: &Budget) -> Result<DetectorReport, DetectorError> {
        let mut qualifying = Vec::new();
        for (index, transaction) in transactions.iter().enumerate() {
            budget.check_at(index, NAME)?;
            if transaction.is_round_dollar(self.minimum) {
                qualifying.push(transaction.id.clone());
            }
        }

        let total = transactions.len();
        // Integer comparison keeps the threshold exact: 30% of 100 is not "more than 30%"
        let triggered = total > 0 && qualifying.len() * 100 > self.ratio_pct as usize * total;
        if !triggered {
            return Ok(DetectorReport::default());
        }

        let share = qualifying.len() as f64 * 100.0 / total as f64;
        Ok(DetectorReport::anomalies(vec![AnomalyDetectionResult {
            anomaly_type: AnomalyType::RoundDollar,
            severity: Severity::Medium,
            description: format!(
                "{} of {} transactions ({:.1}%) are whole-dollar amounts of at least {}, above the {}% threshold",
                qualifying.len(),
                total,
                share,
                self.minimum,
                self.ratio_pct
            ),
            detection_method: "Round-dollar frequency analysis".to_string(),
            affected_transactions: qualifying,
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionKind;
    use rust_decimal_macros::dec;

    fn batch(round: usize, total: usize) -> Vec<Transaction> {
        (0..total)
            .map(|i| {
                let amount = if i < round { dec!(500) } else { dec!(123.45) };
                Transaction::new(format!("t{}", i), amount, TransactionKind::Expense)
            })
            .collect()
    }

    fn run(transactions: &[Transaction]) -> Vec<AnomalyDetectionResult> {
        RoundDollarDetector::default()
            .detect(transactions, &Budget::unlimited())
            .unwrap()
            .anomalies
    }

    #[test]
    fn test_exactly_thirty_percent_does_not_trigger() {
        assert!(run(&batch(30, 100)).is_empty());
    }

    #[test]
    fn test_thirty_one_percent_triggers() {
        let anomalies = run(&batch(31, 100));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::Medium);
        assert_eq!(anomalies[0].affected_transactions.len(), 31);
        assert_eq!(anomalies[0].affected_transactions[0], "t0");
    }

    #[test]
    fn test_small_round_amounts_do_not_qualify() {
        let txs: Vec<_> = (0..5)
            .map(|i| Transaction::new(format!("t{}", i), dec!(50), TransactionKind::Expense))
            .collect();
        assert!(run(&txs).is_empty());
    }

    #[test]
    fn test_empty_set() {
        assert!(run(&[]).is_empty());
    }
}
