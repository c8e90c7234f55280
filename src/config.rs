//! Engine configuration
//!
//! Heuristic weights, thresholds and reference tables are immutable data handed
//! to the scorer and detectors. A config can be saved to and loaded from a
//! pretty-printed JSON file, and a per-tenant override can be stored in the
//! `settings` table (see [`crate::database::Database::tenant_config`]).

use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Canonical first-digit frequencies (percent) for digits 1 through 9
pub const BENFORD_EXPECTED: [f64; 9] = [30.1, 17.6, 12.5, 9.7, 7.9, 6.7, 5.8, 5.1, 4.6];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub scoring: ScoringRules,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub benford: BenfordConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            scoring: ScoringRules::default(),
            detectors: DetectorConfig::default(),
            benford: BenfordConfig::default(),
        }
    }
}

/// Weights and cut-offs for the per-transaction risk scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub round_amount_minimum: Decimal,
    pub round_amount_points: u32,
    pub large_amount_threshold: Decimal,
    pub large_amount_points: u32,
    pub weekend_points: u32,
    pub vague_description_min_len: usize,
    pub vague_description_points: u32,
    pub suspicious_keywords: Vec<String>,
    pub suspicious_keyword_points: u32,
    /// Scores at or above this are `high` risk
    pub high_risk_score: u32,
    /// Scores at or above this are `medium` risk
    pub medium_risk_score: u32,
    /// Scores at or above this are `improper`
    pub improper_score: u32,
    /// Scores at or above this are `questionable`
    pub questionable_score: u32,
    /// Scores below this are `proper`
    pub proper_below_score: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            round_amount_minimum: Decimal::from(100),
            round_amount_points: 15,
            large_amount_threshold: Decimal::from(50_000),
            large_amount_points: 25,
            weekend_points: 20,
            vague_description_min_len: 10,
            vague_description_points: 10,
            suspicious_keywords: ["cash", "consulting", "misc", "various", "expenses"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            suspicious_keyword_points: 15,
            high_risk_score: 50,
            medium_risk_score: 25,
            improper_score: 60,
            questionable_score: 40,
            proper_below_score: 20,
        }
    }
}

/// Settings shared by the batch anomaly detectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum absolute amount for the round-dollar bias test
    pub round_dollar_minimum: Decimal,
    /// Percentage of round-dollar transactions that must be exceeded
    pub round_dollar_ratio_pct: u32,
    /// First hour of the business day (inclusive, UTC)
    pub business_hours_start: u32,
    /// Hour the business day ends (exclusive, UTC)
    pub business_hours_end: u32,
    /// Wall-clock budget per detector run
    pub budget_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            round_dollar_minimum: Decimal::from(100),
            round_dollar_ratio_pct: 30,
            business_hours_start: 6,
            business_hours_end: 22,
            budget_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenfordConfig {
    /// Expected frequency (percent) for leading digits 1..=9
    pub expected: [f64; 9],
    /// Allowed absolute deviation in percentage points
    pub tolerance_pct: f64,
    /// Number of failing digits that escalates to an anomaly
    pub failing_digits_trigger: usize,
}

impl Default for BenfordConfig {
    fn default() -> Self {
        Self {
            expected: BENFORD_EXPECTED,
            tolerance_pct: 2.0,
            failing_digits_trigger: 3,
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would make the engine misbehave
    pub fn validate(&self) -> EngineResult<()> {
        let mut errors = Vec::new();

        let d = &self.detectors;
        if d.business_hours_start >= d.business_hours_end || d.business_hours_end > 24 {
            errors.push(format!(
                "business hours [{}, {}) are not a valid window",
                d.business_hours_start, d.business_hours_end
            ));
        }
        if d.round_dollar_ratio_pct > 100 {
            errors.push("round_dollar_ratio_pct must be at most 100".to_string());
        }

        let s = &self.scoring;
        if s.medium_risk_score > s.high_risk_score {
            errors.push("medium_risk_score must not exceed high_risk_score".to_string());
        }
        if s.proper_below_score > s.questionable_score || s.questionable_score > s.improper_score {
            errors.push("legitimacy thresholds must be ordered proper < questionable <= improper".to_string());
        }

        let b = &self.benford;
        if b.expected.iter().any(|p| *p <= 0.0) {
            errors.push("Benford expected frequencies must be positive".to_string());
        }
        if b.tolerance_pct < 0.0 {
            errors.push("Benford tolerance must not be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Config(errors.join("; ")))
        }
    }

    /// Parse a config from JSON text and validate it
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if config.version > CONFIG_VERSION {
            warn!(
                "Config version {} is newer than supported version {}",
                config.version, CONFIG_VERSION
            );
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a config file
    pub fn load(path: &Path) -> EngineResult<Self> {
        info!("Loading engine config from: {}", path.display());
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the config as pretty JSON
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let json = self.to_json()?;
        fs::write(path, &json)?;
        info!("Engine config saved: {} bytes", json.len());
        Ok(())
    }
}
