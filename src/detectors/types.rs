//! Anomaly records and detector outputs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(EngineError::validation(format!("Unknown severity '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    DuplicatePayment,
    UnusualTiming,
    RoundDollar,
    BenfordViolation,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::DuplicatePayment => "duplicate_payment",
            AnomalyType::UnusualTiming => "unusual_timing",
            AnomalyType::RoundDollar => "round_dollar",
            AnomalyType::BenfordViolation => "benford_violation",
        }
    }
}

impl FromStr for AnomalyType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate_payment" => Ok(AnomalyType::DuplicatePayment),
            "unusual_timing" => Ok(AnomalyType::UnusualTiming),
            "round_dollar" => Ok(AnomalyType::RoundDollar),
            "benford_violation" => Ok(AnomalyType::BenfordViolation),
            other => Err(EngineError::validation(format!("Unknown anomaly type '{}'", other))),
        }
    }
}

/// Reviewer workflow state. New anomalies are always `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    #[default]
    Pending,
    UnderReview,
    Confirmed,
    Dismissed,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyStatus::Pending => "pending",
            AnomalyStatus::UnderReview => "under_review",
            AnomalyStatus::Confirmed => "confirmed",
            AnomalyStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for AnomalyStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnomalyStatus::Pending),
            "under_review" => Ok(AnomalyStatus::UnderReview),
            "confirmed" => Ok(AnomalyStatus::Confirmed),
            "dismissed" => Ok(AnomalyStatus::Dismissed),
            other => Err(EngineError::validation(format!("Unknown anomaly status '{}'", other))),
        }
    }
}

/// What a detector found, before it is tied to an investigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyDetectionResult {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub detection_method: String,
    pub affected_transactions: Vec<String>,
}

/// Stored anomaly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub id: String,
    pub investigation_id: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub detection_method: String,
    pub affected_transactions: Vec<String>,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn record(investigation_id: &str, finding: &AnomalyDetectionResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: investigation_id.to_string(),
            anomaly_type: finding.anomaly_type,
            severity: finding.severity,
            description: finding.description.clone(),
            detection_method: finding.detection_method.clone(),
            affected_transactions: finding.affected_transactions.clone(),
            status: AnomalyStatus::Pending,
            detected_at: Utc::now(),
        }
    }
}

/// One row of the first-digit comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenfordAnalysisResult {
    pub digit: u8,
    pub observed_pct: f64,
    pub expected_pct: f64,
    /// Observed minus expected, in percentage points
    pub deviation: f64,
    pub chi_square: f64,
    pub passed: bool,
}

/// Everything a single detector run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectorReport {
    pub anomalies: Vec<AnomalyDetectionResult>,
    /// Only the Benford detector fills this in
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub digits: Vec<BenfordAnalysisResult>,
}

impl DetectorReport {
    pub fn anomalies(anomalies: Vec<AnomalyDetectionResult>) -> Self {
        Self {
            anomalies,
            digits: Vec::new(),
        }
    }
}
