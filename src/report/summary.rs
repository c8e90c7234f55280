//! Aggregation of stored findings into an [`InvestigationSummary`]
//!
//! Pure read and count: nothing here touches analysis data.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use super::template::format_currency;
use super::types::*;
use crate::damages::DamageCalculation;
use crate::detectors::{Anomaly, AnomalyType, Severity};
use crate::investigation::Investigation;
use crate::scoring::{LegitimacyAssessment, RiskLevel, TransactionAnalysis};

const TOP_RED_FLAGS: usize = 5;

const STANDARD_RECOMMENDATIONS: [&str; 5] = [
    "Obtain supporting documentation for every improper and questionable transaction",
    "Interview the personnel who initiated or approved the flagged transactions",
    "Review internal controls over disbursement approval and vendor setup",
    "Preserve all evidence under a documented chain of custody",
    "Consult legal counsel on recovery of the identified losses",
];

/// Collects the stored artifacts of one investigation
pub struct SummaryBuilder {
    investigation: Investigation,
    analyses: Vec<TransactionAnalysis>,
    anomalies: Vec<Anomaly>,
    damages: Vec<DamageCalculation>,
    evidence_count: usize,
    flow_trace_count: usize,
}

impl InvestigationSummary {
    pub fn builder(investigation: Investigation) -> SummaryBuilder {
        SummaryBuilder {
            investigation,
            analyses: Vec::new(),
            anomalies: Vec::new(),
            damages: Vec::new(),
            evidence_count: 0,
            flow_trace_count: 0,
        }
    }
}

impl SummaryBuilder {
    /// Stored analyses in insertion order; only the latest verdict per transaction counts
    pub fn analyses(mut self, analyses: Vec<TransactionAnalysis>) -> Self {
        let mut latest: Vec<TransactionAnalysis> = Vec::with_capacity(analyses.len());
        let mut position: HashMap<String, usize> = HashMap::new();

        for analysis in analyses {
            match position.get(&analysis.transaction_id) {
                Some(&index) => {
                    if analysis.analyzed_at >= latest[index].analyzed_at {
                        latest[index] = analysis;
                    }
                }
                None => {
                    position.insert(analysis.transaction_id.clone(), latest.len());
                    latest.push(analysis);
                }
            }
        }

        self.analyses = latest;
        self
    }

    pub fn anomalies(mut self, anomalies: Vec<Anomaly>) -> Self {
        self.anomalies = anomalies;
        self
    }

    pub fn damages(mut self, damages: Vec<DamageCalculation>) -> Self {
        self.damages = damages;
        self
    }

    pub fn evidence_count(mut self, count: usize) -> Self {
        self.evidence_count = count;
        self
    }

    pub fn flow_trace_count(mut self, count: usize) -> Self {
        self.flow_trace_count = count;
        self
    }

    pub fn build(self) -> InvestigationSummary {
        let mut by_assessment = AssessmentCounts::default();
        let mut by_risk = RiskCounts::default();
        let mut improper_total = Decimal::ZERO;
        let mut flag_counts: HashMap<&str, usize> = HashMap::new();

        for analysis in &self.analyses {
            match analysis.legitimacy_assessment {
                LegitimacyAssessment::Proper => by_assessment.proper += 1,
                LegitimacyAssessment::Questionable => by_assessment.questionable += 1,
                LegitimacyAssessment::Improper => {
                    by_assessment.improper += 1;
                    improper_total += analysis.transaction_amount.abs();
                }
                LegitimacyAssessment::UnableToDetermine => by_assessment.unable_to_determine += 1,
            }
            match analysis.risk_level {
                RiskLevel::Low => by_risk.low += 1,
                RiskLevel::Medium => by_risk.medium += 1,
                RiskLevel::High => by_risk.high += 1,
            }
            for flag in &analysis.red_flags {
                *flag_counts.entry(flag.label()).or_insert(0) += 1;
            }
        }

        let mut anomalies_by_severity = SeverityCounts::default();
        for anomaly in &self.anomalies {
            match anomaly.severity {
                Severity::Low => anomalies_by_severity.low += 1,
                Severity::Medium => anomalies_by_severity.medium += 1,
                Severity::High => anomalies_by_severity.high += 1,
                Severity::Critical => anomalies_by_severity.critical += 1,
            }
        }

        let mut top_red_flags: Vec<RedFlagCount> = flag_counts
            .into_iter()
            .map(|(flag, count)| RedFlagCount {
                flag: flag.to_string(),
                count,
            })
            .collect();
        top_red_flags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.flag.cmp(&b.flag)));
        top_red_flags.truncate(TOP_RED_FLAGS);

        let primary_concerns = primary_concerns(&by_assessment, &by_risk, improper_total, &self.anomalies);

        let damages = self
            .damages
            .iter()
            .map(|calc| DamageHeadline {
                method: calc.method,
                total_damage: calc.total_damage,
                confidence_level: calc.confidence_level,
                calculated_at: calc.created_at,
            })
            .collect();

        InvestigationSummary {
            investigation: self.investigation,
            generated_at: Utc::now(),
            evidence_count: self.evidence_count,
            transactions_analyzed: self.analyses.len(),
            by_assessment,
            by_risk,
            anomalies_by_severity,
            improper_total,
            damages,
            flow_trace_count: self.flow_trace_count,
            top_red_flags,
            primary_concerns,
            recommendations: STANDARD_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

fn primary_concerns(
    assessments: &AssessmentCounts,
    risks: &RiskCounts,
    improper_total: Decimal,
    anomalies: &[Anomaly],
) -> Vec<String> {
    let mut concerns = Vec::new();

    if assessments.improper > 0 {
        concerns.push(format!(
            "{} transaction(s) assessed as improper, totaling {}",
            assessments.improper,
            format_currency(improper_total)
        ));
    }
    if risks.high > 0 {
        concerns.push(format!(
            "{} high-risk transaction(s) lack adequate support",
            risks.high
        ));
    }

    let count_of = |kind: AnomalyType| anomalies.iter().filter(|a| a.anomaly_type == kind).count();

    let duplicates = count_of(AnomalyType::DuplicatePayment);
    if duplicates > 0 {
        concerns.push(format!("{} group(s) of potential duplicate payments", duplicates));
    }
    let timing = count_of(AnomalyType::UnusualTiming);
    if timing > 0 {
        concerns.push(format!(
            "{} posting(s) made on weekends or outside business hours",
            timing
        ));
    }
    if count_of(AnomalyType::RoundDollar) > 0 {
        concerns.push("Unusual concentration of round-dollar amounts".to_string());
    }
    if count_of(AnomalyType::BenfordViolation) > 0 {
        concerns.push("Leading-digit distribution departs from Benford's Law".to_string());
    }

    if concerns.is_empty() {
        concerns.push("No significant concerns identified by automated analysis".to_string());
    }
    concerns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::AnomalyDetectionResult;
    use crate::investigation::NewInvestigation;
    use crate::scoring::{RedFlag, TransactionAnalysisResult};
    use crate::transaction::{Transaction, TransactionKind};
    use rust_decimal_macros::dec;

    fn analysis(
        amount: Decimal,
        score: u32,
        legitimacy: LegitimacyAssessment,
        risk: RiskLevel,
        flags: Vec<RedFlag>,
    ) -> TransactionAnalysis {
        let tx = Transaction::new(uuid::Uuid::new_v4().to_string(), amount, TransactionKind::Expense);
        let result = TransactionAnalysisResult {
            transaction_id: tx.id.clone(),
            risk_level: risk,
            legitimacy_assessment: legitimacy,
            red_flags: flags,
            score,
        };
        TransactionAnalysis::record("inv-1", &tx, &result)
    }

    fn investigation() -> Investigation {
        NewInvestigation::titled("Vendor kickbacks").into_investigation("owner-1").unwrap()
    }

    #[test]
    fn test_counts_and_improper_total() {
        let analyses = vec![
            analysis(
                dec!(-1000),
                70,
                LegitimacyAssessment::Improper,
                RiskLevel::High,
                vec![RedFlag::LargeAmount, RedFlag::Weekend],
            ),
            analysis(dec!(250.50), 65, LegitimacyAssessment::Improper, RiskLevel::High, vec![RedFlag::Weekend]),
            analysis(dec!(80), 45, LegitimacyAssessment::Questionable, RiskLevel::Medium, vec![RedFlag::VagueDescription]),
            analysis(dec!(12.34), 0, LegitimacyAssessment::Proper, RiskLevel::Low, Vec::new()),
        ];
        let anomaly = Anomaly::record(
            "inv-1",
            &AnomalyDetectionResult {
                anomaly_type: AnomalyType::DuplicatePayment,
                severity: Severity::High,
                description: "dup".to_string(),
                detection_method: "exact".to_string(),
                affected_transactions: vec!["a".to_string(), "b".to_string()],
            },
        );

        let summary = InvestigationSummary::builder(investigation())
            .analyses(analyses)
            .anomalies(vec![anomaly])
            .evidence_count(3)
            .build();

        assert_eq!(summary.transactions_analyzed, 4);
        assert_eq!(summary.by_assessment.improper, 2);
        assert_eq!(summary.by_assessment.questionable, 1);
        assert_eq!(summary.by_risk.high, 2);
        assert_eq!(summary.improper_total, dec!(1250.50));
        assert_eq!(summary.anomalies_by_severity.high, 1);
        assert_eq!(summary.top_red_flags[0].flag, RedFlag::Weekend.label());
        assert_eq!(summary.top_red_flags[0].count, 2);
        assert!(summary.primary_concerns[0].contains("$1,250.50"));
        assert!(summary.primary_concerns.iter().any(|c| c.contains("duplicate")));
        assert_eq!(summary.recommendations.len(), STANDARD_RECOMMENDATIONS.len());
    }

    #[test]
    fn test_empty_investigation_has_placeholder_concern() {
        let summary = InvestigationSummary::builder(investigation()).build();
        assert_eq!(summary.transactions_analyzed, 0);
        assert_eq!(summary.improper_total, Decimal::ZERO);
        assert_eq!(summary.primary_concerns.len(), 1);
    }

    #[test]
    fn test_reanalysis_keeps_latest_verdict_per_transaction() {
        let first = analysis(dec!(-75000), 85, LegitimacyAssessment::Improper, RiskLevel::High, vec![RedFlag::Weekend]);
        let mut rescored = first.clone();
        rescored.id = "rescored".to_string();
        rescored.analyzed_at = first.analyzed_at + chrono::Duration::seconds(1);
        rescored.legitimacy_assessment = LegitimacyAssessment::Questionable;
        rescored.risk_level = RiskLevel::Medium;
        let other = analysis(dec!(12), 0, LegitimacyAssessment::Proper, RiskLevel::Low, Vec::new());

        let summary = InvestigationSummary::builder(investigation())
            .analyses(vec![first, other, rescored])
            .build();

        assert_eq!(summary.transactions_analyzed, 2);
        assert_eq!(summary.by_assessment.improper, 0);
        assert_eq!(summary.by_assessment.questionable, 1);
        assert_eq!(summary.improper_total, Decimal::ZERO);
        assert_eq!(summary.top_red_flags[0].count, 1);
    }
}

