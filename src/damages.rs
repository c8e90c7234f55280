//! Damage quantification
//!
//! Two accepted methods, each returning a [`DamageCalculation`] whose breakdown
//! sums exactly to the total and which always states its assumptions and
//! limitations. Pre-judgment interest is simple interest on a 365.25-day year.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::transaction::{Transaction, TransactionKind};

/// Seconds in a 365.25-day year
const SECONDS_PER_YEAR: i64 = 31_557_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageMethod {
    DirectLoss,
    NetWorth,
}

impl DamageMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageMethod::DirectLoss => "direct_loss",
            DamageMethod::NetWorth => "net_worth",
        }
    }
}

impl FromStr for DamageMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_loss" => Ok(DamageMethod::DirectLoss),
            "net_worth" => Ok(DamageMethod::NetWorth),
            other => Err(EngineError::validation(format!("Unknown damage method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(ConfidenceLevel::High),
            "medium" => Ok(ConfidenceLevel::Medium),
            "low" => Ok(ConfidenceLevel::Low),
            other => Err(EngineError::validation(format!("Unknown confidence level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageLineItem {
    pub category: String,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageCalculation {
    pub id: String,
    /// Set when the calculation is tied to (and stored under) an investigation
    pub investigation_id: Option<String>,
    pub method: DamageMethod,
    pub total_damage: Decimal,
    pub breakdown: Vec<DamageLineItem>,
    pub confidence_level: ConfidenceLevel,
    pub assumptions: Vec<String>,
    pub limitations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DamageCalculation {
    fn new(
        method: DamageMethod,
        total_damage: Decimal,
        breakdown: Vec<DamageLineItem>,
        confidence_level: ConfidenceLevel,
        assumptions: &[&str],
        limitations: &[&str],
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: None,
            method,
            total_damage,
            breakdown,
            confidence_level,
            assumptions: assumptions.iter().map(|s| s.to_string()).collect(),
            limitations: limitations.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    pub fn for_investigation(mut self, investigation_id: &str) -> Self {
        self.investigation_id = Some(investigation_id.to_string());
        self
    }

    pub fn breakdown_total(&self) -> Decimal {
        self.breakdown.iter().map(|item| item.amount).sum()
    }
}

// =============================================================================
// Direct loss
// =============================================================================

fn too_large() -> EngineError {
    EngineError::validation("Amount too large to calculate exactly")
}

/// Sum that reports overflow instead of panicking
fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> EngineResult<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or_else(too_large)
}

/// Sum of absolute amounts over transactions already judged improper
pub fn direct_loss(transactions: &[Transaction]) -> EngineResult<DamageCalculation> {
    if transactions.is_empty() {
        return Err(EngineError::validation(
            "Direct loss needs at least one transaction id",
        ));
    }

    let kinds = [TransactionKind::Expense, TransactionKind::Transfer, TransactionKind::Income];
    let mut breakdown = Vec::new();
    for kind in kinds {
        let matching: Vec<&Transaction> = transactions.iter().filter(|t| t.kind == kind).collect();
        if matching.is_empty() {
            continue;
        }
        breakdown.push(DamageLineItem {
            category: kind.as_str().to_string(),
            amount: checked_sum(matching.iter().map(|t| t.abs_amount()))?,
            description: format!("{} improper {} transaction(s)", matching.len(), kind.as_str()),
        });
    }

    let total = checked_sum(breakdown.iter().map(|item| item.amount))?;

    Ok(DamageCalculation::new(
        DamageMethod::DirectLoss,
        total,
        breakdown,
        ConfidenceLevel::High,
        &[
            "All listed transactions are improper",
            "Transaction amounts are recorded accurately in the ledger",
        ],
        &[
            "Excludes consequential damages",
            "Excludes interest",
        ],
    ))
}

// =============================================================================
// Net-worth method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetWorthInputs {
    pub beginning_net_worth: Decimal,
    pub ending_net_worth: Decimal,
    pub personal_expenditures: Decimal,
    pub legitimate_income: Decimal,
}

/// Unexplained wealth: `(ending - beginning) + expenditures - legitimate income`
pub fn net_worth_method(inputs: &NetWorthInputs) -> EngineResult<DamageCalculation> {
    let fields = [
        ("beginning net worth", inputs.beginning_net_worth),
        ("ending net worth", inputs.ending_net_worth),
        ("personal expenditures", inputs.personal_expenditures),
        ("legitimate income", inputs.legitimate_income),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| v.is_sign_negative() && !v.is_zero()) {
        return Err(EngineError::validation(format!("{} must not be negative", name)));
    }

    let change = inputs
        .ending_net_worth
        .checked_sub(inputs.beginning_net_worth)
        .ok_or_else(too_large)?;
    let breakdown = vec![
        DamageLineItem {
            category: "net_worth_change".to_string(),
            amount: change,
            description: format!(
                "Net worth moved from {} to {}",
                inputs.beginning_net_worth, inputs.ending_net_worth
            ),
        },
        DamageLineItem {
            category: "personal_expenditures".to_string(),
            amount: inputs.personal_expenditures,
            description: "Personal living expenditures over the period".to_string(),
        },
        DamageLineItem {
            category: "legitimate_income".to_string(),
            amount: -inputs.legitimate_income,
            description: "Income from documented legitimate sources".to_string(),
        },
    ];
    let total = change
        .checked_add(inputs.personal_expenditures)
        .and_then(|t| t.checked_sub(inputs.legitimate_income))
        .ok_or_else(too_large)?;

    Ok(DamageCalculation::new(
        DamageMethod::NetWorth,
        total,
        breakdown,
        ConfidenceLevel::Medium,
        &[
            "Asset and liability statements are complete at both dates",
            "All legitimate income sources have been disclosed",
            "Personal expenditure estimates are reasonable",
        ],
        &[
            "Depends on the completeness of financial disclosure",
            "Cannot identify the specific source of unexplained funds",
            "Hidden assets or cash hoards may be understated",
        ],
    ))
}

// =============================================================================
// Pre-judgment interest
// =============================================================================

/// Simple interest from `loss_date` to `as_of`, rounded to cents.
///
/// A loss date after `as_of` accrues nothing.
pub fn pre_judgment_interest_as_of(
    amount: Decimal,
    loss_date: DateTime<Utc>,
    annual_rate: Decimal,
    as_of: DateTime<Utc>,
) -> EngineResult<Decimal> {
    if annual_rate.is_sign_negative() && !annual_rate.is_zero() {
        return Err(EngineError::validation("Interest rate must not be negative"));
    }

    let seconds = (as_of - loss_date).num_seconds();
    if seconds <= 0 {
        return Ok(Decimal::ZERO);
    }

    let interest = amount
        .checked_mul(annual_rate)
        .and_then(|v| v.checked_mul(Decimal::from(seconds)))
        .and_then(|v| v.checked_div(Decimal::from(SECONDS_PER_YEAR)))
        .ok_or_else(too_large)?;
    Ok(interest.round_dp(2))
}

/// Simple interest accrued from `loss_date` until now
pub fn pre_judgment_interest(amount: Decimal, loss_date: DateTime<Utc>, annual_rate: Decimal) -> EngineResult<Decimal> {
    pre_judgment_interest_as_of(amount, loss_date, annual_rate, Utc::now())
}
