//! Duplicate-payment detection
//!
//! Transactions are grouped on the exact composite key
//! `(amount, description or "none", calendar day)`. Every group with two or
//! more members is one high-severity anomaly naming all of its members.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{AnomalyDetectionResult, AnomalyType, Budget, Detector, DetectorError, DetectorReport, Severity};
use crate::transaction::Transaction;

const NAME: &str = "duplicate_payments";
const NO_DESCRIPTION: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DuplicateKey {
    amount: Decimal,
    description: String,
    day: Option<NaiveDate>,
}

impl DuplicateKey {
    fn of(transaction: &Transaction) -> Self {
        Self {
            amount: transaction.amount.normalize(),
            description: transaction.description_text().unwrap_or(NO_DESCRIPTION).to_string(),
            day: transaction.day(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicatePaymentDetector;

impl Detector for DuplicatePaymentDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, transactions: &[Transaction], budget: &Budget) -> Result<DetectorReport, DetectorError> {
        // Groups are reported in order of first appearance
        let mut order: Vec<DuplicateKey> = Vec::new();
        let mut groups: HashMap<DuplicateKey, Vec<&str>> = HashMap::new();

        for (index, transaction) in transactions.iter().enumerate() {
            budget.check_at(index, NAME)?;
            let key = DuplicateKey::of(transaction);
            let members = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                Vec::new()
            });
            members.push(transaction.id.as_str());
        }

        let anomalies = order
            .into_iter()
            .filter_map(|key| {
                let members = groups.remove(&key)?;
                if members.len() < 2 {
                    return None;
                }
                let day = key
                    .day
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "an unknown date".to_string());
                Some(AnomalyDetectionResult {
                    anomaly_type: AnomalyType::DuplicatePayment,
                    severity: Severity::High,
                    description: format!(
                        "{} transactions of {} on {} with description \"{}\"",
                        members.len(),
                        key.amount,
                        day,
                        key.description
                    ),
                    detection_method: "Exact match on amount, description and transaction date".to_string(),
                    affected_transactions: members.into_iter().map(str::to_string).collect(),
                })
            })
            .collect();

        Ok(DetectorReport::anomalies(anomalies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionKind;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn tx(id: &str, amount: Decimal, description: Option<&str>, hour: u32) -> Transaction {
        let mut t = Transaction::new(id, amount, TransactionKind::Expense)
            .with_date(Utc.with_ymd_and_hms(2024, 5, 14, hour, 0, 0).unwrap());
        t.description = description.map(str::to_string);
        t
    }

    fn run(transactions: &[Transaction]) -> Vec<AnomalyDetectionResult> {
        DuplicatePaymentDetector
            .detect(transactions, &Budget::unlimited())
            .unwrap()
            .anomalies
    }

    #[test]
    fn test_exact_matches_group_and_different_description_does_not() {
        let txs = vec![
            tx("a", dec!(1500), Some("Vendor invoice 88"), 9),
            tx("b", dec!(1500), Some("Vendor invoice 88"), 16),
            tx("c", dec!(1500), Some("Vendor invoice 89"), 11),
        ];
        let anomalies = run(&txs);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].affected_transactions, vec!["a", "b"]);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::DuplicatePayment);
    }

    #[test]
    fn test_group_size_counts_every_exact_match() {
        let txs = vec![
            tx("a", dec!(42.10), None, 9),
            tx("b", dec!(42.10), None, 10),
            tx("c", dec!(42.1), None, 11),
            tx("d", dec!(42.11), None, 12),
        ];
        let anomalies = run(&txs);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].affected_transactions, vec!["a", "b", "c"]);
        assert!(anomalies[0].description.contains("\"none\""));
    }

    #[test]
    fn test_blank_and_missing_descriptions_group_together() {
        let txs = vec![
            tx("a", dec!(310), Some(""), 9),
            tx("b", dec!(310), None, 10),
            tx("c", dec!(310), Some("   "), 11),
        ];
        let anomalies = run(&txs);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].affected_transactions, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_different_days_do_not_group() {
        let mut later = tx("b", dec!(900), Some("Rent"), 9);
        later.date = Some(Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap());
        let txs = vec![tx("a", dec!(900), Some("Rent"), 9), later];
        assert!(run(&txs).is_empty());
    }

    #[test]
    fn test_empty_input_is_success() {
        assert!(run(&[]).is_empty());
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let txs = vec![tx("a", dec!(1), None, 9)];
        let result = DuplicatePaymentDetector.detect(&txs, &Budget::new(std::time::Duration::ZERO));
        assert!(matches!(result, Err(DetectorError::BudgetExceeded { .. })));
    }
}
