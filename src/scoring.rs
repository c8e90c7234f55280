//! Per-transaction risk scoring
//!
//! Scoring is additive: each heuristic in [`ScoringRules`] either fires or not
//! and contributes its points. The total maps onto a risk level and a
//! legitimacy assessment. Scoring is a pure function of the transaction and
//! the rules; persisting the result is the caller's business.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc, Weekday};
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ScoringRules;
use crate::error::{EngineError, EngineResult};
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(EngineError::validation(format!("Unknown risk level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegitimacyAssessment {
    Proper,
    Questionable,
    Improper,
    UnableToDetermine,
}

impl LegitimacyAssessment {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegitimacyAssessment::Proper => "proper",
            LegitimacyAssessment::Questionable => "questionable",
            LegitimacyAssessment::Improper => "improper",
            LegitimacyAssessment::UnableToDetermine => "unable_to_determine",
        }
    }
}

impl FromStr for LegitimacyAssessment {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proper" => Ok(LegitimacyAssessment::Proper),
            "questionable" => Ok(LegitimacyAssessment::Questionable),
            "improper" => Ok(LegitimacyAssessment::Improper),
            "unable_to_determine" => Ok(LegitimacyAssessment::UnableToDetermine),
            other => Err(EngineError::validation(format!(
                "Unknown legitimacy assessment '{}'",
                other
            ))),
        }
    }
}

/// Named irregularity signal on a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedFlag {
    #[serde(rename = "Round dollar amount")]
    RoundAmount,
    #[serde(rename = "Unusually large amount")]
    LargeAmount,
    #[serde(rename = "Weekend transaction")]
    Weekend,
    #[serde(rename = "Vague or missing description")]
    VagueDescription,
    #[serde(rename = "Suspicious description keywords")]
    SuspiciousKeywords,
}

impl RedFlag {
    pub fn label(&self) -> &'static str {
        match self {
            RedFlag::RoundAmount => "Round dollar amount",
            RedFlag::LargeAmount => "Unusually large amount",
            RedFlag::Weekend => "Weekend transaction",
            RedFlag::VagueDescription => "Vague or missing description",
            RedFlag::SuspiciousKeywords => "Suspicious description keywords",
        }
    }
}

impl fmt::Display for RedFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RedFlag {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            RedFlag::RoundAmount,
            RedFlag::LargeAmount,
            RedFlag::Weekend,
            RedFlag::VagueDescription,
            RedFlag::SuspiciousKeywords,
        ]
        .into_iter()
        .find(|flag| flag.label() == s)
        .ok_or_else(|| EngineError::validation(format!("Unknown red flag '{}'", s)))
    }
}

/// Scorer output for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAnalysisResult {
    pub transaction_id: String,
    pub risk_level: RiskLevel,
    pub legitimacy_assessment: LegitimacyAssessment,
    pub red_flags: Vec<RedFlag>,
    pub score: u32,
}

/// Persisted analysis row; a snapshot of the transaction plus the verdict.
/// Rows are immutable: re-analysis writes a new row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionAnalysis {
    pub id: String,
    pub investigation_id: String,
    pub transaction_id: String,
    pub transaction_date: Option<DateTime<Utc>>,
    pub transaction_amount: Decimal,
    pub transaction_description: Option<String>,
    pub risk_level: RiskLevel,
    pub legitimacy_assessment: LegitimacyAssessment,
    pub red_flags: Vec<RedFlag>,
    pub score: u32,
    pub analyzed_at: DateTime<Utc>,
}

impl TransactionAnalysis {
    pub fn record(investigation_id: &str, transaction: &Transaction, result: &TransactionAnalysisResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: investigation_id.to_string(),
            transaction_id: transaction.id.clone(),
            transaction_date: transaction.date,
            transaction_amount: transaction.amount,
            transaction_description: transaction.description.clone(),
            risk_level: result.risk_level,
            legitimacy_assessment: result.legitimacy_assessment,
            red_flags: result.red_flags.clone(),
            score: result.score,
            analyzed_at: Utc::now(),
        }
    }
}

impl ScoringRules {
    pub fn risk_level(&self, score: u32) -> RiskLevel {
        if score >= self.high_risk_score {
            RiskLevel::High
        } else if score >= self.medium_risk_score {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// The band between `proper_below_score` and `questionable_score` stays
    /// undetermined rather than defaulting to a verdict.
    pub fn legitimacy(&self, score: u32) -> LegitimacyAssessment {
        if score >= self.improper_score {
            LegitimacyAssessment::Improper
        } else if score >= self.questionable_score {
            LegitimacyAssessment::Questionable
        } else if score < self.proper_below_score {
            LegitimacyAssessment::Proper
        } else {
            LegitimacyAssessment::UnableToDetermine
        }
    }
}

/// Compiled form of [`ScoringRules`]
#[derive(Debug, Clone)]
pub struct RiskScorer {
    rules: ScoringRules,
    keywords: Option<Regex>,
}

impl RiskScorer {
    pub fn new(rules: ScoringRules) -> EngineResult<Self> {
        let alternatives: Vec<String> = rules
            .suspicious_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        let keywords = if alternatives.is_empty() {
            None
        } else {
            let pattern = RegexBuilder::new(&alternatives.join("|"))
                .case_insensitive(true)
                .build()
                .map_err(|e| EngineError::Config(format!("Invalid keyword pattern: {}", e)))?;
            Some(pattern)
        };

        Ok(Self { rules, keywords })
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    pub fn score(&self, transaction: &Transaction) -> TransactionAnalysisResult {
        let rules = &self.rules;
        let mut score = 0u32;
        let mut red_flags = Vec::new();

        let abs = transaction.abs_amount();

        if transaction.is_round_dollar(rules.round_amount_minimum) {
            score += rules.round_amount_points;
            red_flags.push(RedFlag::RoundAmount);
        }

        if abs > rules.large_amount_threshold {
            score += rules.large_amount_points;
            red_flags.push(RedFlag::LargeAmount);
        }

        if transaction.date.map(|d| is_weekend(&d)).unwrap_or(false) {
            score += rules.weekend_points;
            red_flags.push(RedFlag::Weekend);
        }

        let description = transaction.description.as_deref().unwrap_or("");
        if description.chars().count() < rules.vague_description_min_len {
            score += rules.vague_description_points;
            red_flags.push(RedFlag::VagueDescription);
        }

        if let Some(pattern) = &self.keywords {
            if pattern.is_match(description) {
                score += rules.suspicious_keyword_points;
                red_flags.push(RedFlag::SuspiciousKeywords);
            }
        }

        TransactionAnalysisResult {
            transaction_id: transaction.id.clone(),
            risk_level: rules.risk_level(score),
            legitimacy_assessment: rules.legitimacy(score),
            red_flags,
            score,
        }
    }
}

pub fn is_weekend(date: &DateTime<Utc>) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
