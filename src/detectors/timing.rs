//! Unusual-timing detection
//!
//! Two independent checks, each producing its own `unusual_timing` anomaly:
//! postings on a Saturday or Sunday, and postings outside business hours.
//! Both use the UTC calendar.

use chrono::{DateTime, Timelike, Utc};

use super::{AnomalyDetectionResult, AnomalyType, Budget, Detector, DetectorError, DetectorReport, Severity};
use crate::config::DetectorConfig;
use crate::scoring::is_weekend;
use crate::transaction::Transaction;

const NAME: &str = "unusual_timing";

#[derive(Debug, Clone, Copy)]
pub struct UnusualTimingDetector {
    start_hour: u32,
    end_hour: u32,
}

impl UnusualTimingDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            start_hour: config.business_hours_start,
            end_hour: config.business_hours_end,
        }
    }

    fn outside_hours(&self, date: &DateTime<Utc>) -> bool {
        // Bare dates arrive as exactly midnight and carry no time of day
        if date.num_seconds_from_midnight() == 0 && date.nanosecond() == 0 {
            return false;
        }
        let hour = date.hour();
        hour < self.start_hour || hour >= self.end_hour
    }
}

impl Default for UnusualTimingDetector {
    fn default() -> Self {
        Self::new(&DetectorConfig::default())
    }
}

impl Detector for UnusualTimingDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(&self, transactions: &[Transaction], budget: &Budget) -> Result<DetectorReport, DetectorError> {
        let mut anomalies = Vec::new();

        for (index, transaction) in transactions.iter().enumerate() {
            budget.check_at(index, NAME)?;
            let Some(date) = transaction.date else {
                continue;
            };
            let label = transaction.description_text().unwrap_or("(no description)");

            if is_weekend(&date) {
                anomalies.push(AnomalyDetectionResult {
                    anomaly_type: AnomalyType::UnusualTiming,
                    severity: Severity::Medium,
                    description: format!(
                        "Transaction on a weekend ({}): {}",
                        date.format("%A %Y-%m-%d"),
                        label
                    ),
                    detection_method: "Weekend posting check".to_string(),
                    affected_transactions: vec![transaction.id.clone()],
                });
            }

            if self.outside_hours(&date) {
                anomalies.push(AnomalyDetectionResult {
                    anomaly_type: AnomalyType::UnusualTiming,
                    severity: Severity::Medium,
                    description: format!(
                        "Transaction at {} UTC outside business hours ({:02}:00-{:02}:00): {}",
                        date.format("%H:%M"),
                        self.start_hour,
                        self.end_hour,
                        label
                    ),
                    detection_method: "Business hours check".to_string(),
                    affected_transactions: vec![transaction.id.clone()],
                });
            }
        }

        Ok(DetectorReport::anomalies(anomalies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionKind;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(id: &str, y: i32, m: u32, d: u32, h: u32, min: u32) -> Transaction {
        Transaction::new(id, dec!(75.20), TransactionKind::Expense)
            .with_description("Courier charge")
            .with_date(Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap())
    }

    fn run(transactions: &[Transaction]) -> Vec<AnomalyDetectionResult> {
        UnusualTimingDetector::default()
            .detect(transactions, &Budget::unlimited())
            .unwrap()
            .anomalies
    }

    #[test]
    fn test_weekday_business_hours_is_quiet() {
        // 2024-03-05 is a Tuesday
        assert!(run(&[at("a", 2024, 3, 5, 10, 30)]).is_empty());
    }

    #[test]
    fn test_weekend_flagged() {
        // 2024-03-02 is a Saturday
        let anomalies = run(&[at("a", 2024, 3, 2, 11, 0)]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::Medium);
        assert_eq!(anomalies[0].detection_method, "Weekend posting check");
    }

    #[test]
    fn test_after_hours_flagged() {
        let anomalies = run(&[at("late", 2024, 3, 5, 23, 15), at("early", 2024, 3, 5, 5, 59)]);
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies.iter().all(|a| a.detection_method == "Business hours check"));
    }

    #[test]
    fn test_boundaries_of_business_day() {
        assert!(run(&[at("open", 2024, 3, 5, 6, 0)]).is_empty());
        assert_eq!(run(&[at("close", 2024, 3, 5, 22, 0)]).len(), 1);
    }

    #[test]
    fn test_weekend_night_produces_two_findings() {
        let anomalies = run(&[at("a", 2024, 3, 3, 2, 30)]);
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies.iter().all(|a| a.affected_transactions == vec!["a"]));
    }

    #[test]
    fn test_bare_date_and_undated_are_not_after_hours() {
        let bare = Transaction::new("bare", dec!(10), TransactionKind::Expense)
            .with_date(crate::transaction::parse_date("2024-03-05").unwrap());
        let undated = Transaction::new("none", dec!(10), TransactionKind::Expense);
        assert!(run(&[bare, undated]).is_empty());
    }
}
