//! Data structures for forensic reports
//!
//! [`InvestigationSummary`] is the read-only aggregate the synthesizer builds
//! from stored analyses and anomalies. [`ForensicReport`] is the persisted
//! artifact; reports are never edited, a new version is a new row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::damages::{ConfidenceLevel, DamageMethod};
use crate::error::{EngineError, EngineResult};
use crate::investigation::Investigation;

// =============================================================================
// Persisted reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    ExecutiveSummary,
    Findings,
    Damages,
    Custom,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::ExecutiveSummary => "executive_summary",
            ReportType::Findings => "findings",
            ReportType::Damages => "damages",
            ReportType::Custom => "custom",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executive_summary" => Ok(ReportType::ExecutiveSummary),
            "findings" => Ok(ReportType::Findings),
            "damages" => Ok(ReportType::Damages),
            "custom" => Ok(ReportType::Custom),
            other => Err(EngineError::validation(format!("Unknown report type '{}'", other))),
        }
    }
}

/// A stored, timestamped report artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub id: String,
    pub investigation_id: String,
    pub report_type: ReportType,
    pub title: String,
    /// Rendered body (Markdown for generated summaries)
    pub content: String,
    pub generated_by: String,
    pub created_at: DateTime<Utc>,
}

/// Input for storing a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewForensicReport {
    pub investigation_id: String,
    pub report_type: ReportType,
    pub title: String,
    pub content: String,
    pub generated_by: String,
}

impl NewForensicReport {
    pub fn new(
        investigation_id: impl Into<String>,
        report_type: ReportType,
        title: impl Into<String>,
        content: impl Into<String>,
        generated_by: impl Into<String>,
    ) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            report_type,
            title: title.into(),
            content: content.into(),
            generated_by: generated_by.into(),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push("Report title is required");
        }
        if self.content.trim().is_empty() {
            errors.push("Report content is required");
        }
        if self.generated_by.trim().is_empty() {
            errors.push("Report author is required");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::validation(errors.join("; ")))
        }
    }

    pub fn into_report(self) -> EngineResult<ForensicReport> {
        self.validate()?;
        Ok(ForensicReport {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: self.investigation_id,
            report_type: self.report_type,
            title: self.title.trim().to_string(),
            content: self.content,
            generated_by: self.generated_by,
            created_at: Utc::now(),
        })
    }
}

// =============================================================================
// Investigation summary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssessmentCounts {
    pub proper: usize,
    pub questionable: usize,
    pub improper: usize,
    pub unable_to_determine: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedFlagCount {
    pub flag: String,
    pub count: usize,
}

/// Headline figure from a stored damage calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DamageHeadline {
    pub method: DamageMethod,
    pub total_damage: Decimal,
    pub confidence_level: ConfidenceLevel,
    pub calculated_at: DateTime<Utc>,
}

/// Aggregate view of one investigation, ready for rendering
#[derive(Debug, Clone, Serialize)]
pub struct InvestigationSummary {
    pub investigation: Investigation,
    pub generated_at: DateTime<Utc>,
    pub evidence_count: usize,
    pub transactions_analyzed: usize,
    pub by_assessment: AssessmentCounts,
    pub by_risk: RiskCounts,
    pub anomalies_by_severity: SeverityCounts,
    /// Sum of absolute amounts over improper-assessed transactions
    pub improper_total: Decimal,
    pub damages: Vec<DamageHeadline>,
    pub flow_trace_count: usize,
    pub top_red_flags: Vec<RedFlagCount>,
    pub primary_concerns: Vec<String>,
    pub recommendations: Vec<String>,
}
