//! Flow-of-funds tracing
//!
//! An automatic trace only knows the source transaction, so it is a single
//! hop marked `partially_traced`. Longer chains are entered by an investigator
//! through [`NewFlowTrace`] and stored as separate trace records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::transaction::{Transaction, TransactionKind};

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMethod {
    Payment,
    Deposit,
    Transfer,
    Wire,
    Check,
    Cash,
}

impl FlowMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowMethod::Payment => "payment",
            FlowMethod::Deposit => "deposit",
            FlowMethod::Transfer => "transfer",
            FlowMethod::Wire => "wire",
            FlowMethod::Check => "check",
            FlowMethod::Cash => "cash",
        }
    }

    /// Expense-typed transactions leave as payments; everything else arrives as a deposit
    pub fn for_kind(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Expense => FlowMethod::Payment,
            _ => FlowMethod::Deposit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traceability {
    FullyTraced,
    PartiallyTraced,
    Untraced,
}

impl Traceability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Traceability::FullyTraced => "fully_traced",
            Traceability::PartiallyTraced => "partially_traced",
            Traceability::Untraced => "untraced",
        }
    }
}

impl fmt::Display for Traceability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Traceability {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fully_traced" => Ok(Traceability::FullyTraced),
            "partially_traced" => Ok(Traceability::PartiallyTraced),
            "untraced" => Ok(Traceability::Untraced),
            other => Err(EngineError::validation(format!("Unknown traceability '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowHop {
    pub step: u32,
    pub account: String,
    pub entity: String,
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub method: FlowMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOfFundsTrace {
    pub id: String,
    pub investigation_id: String,
    pub source_transaction_id: String,
    pub path: Vec<FlowHop>,
    pub total_traced: Decimal,
    pub ultimate_beneficiaries: Vec<String>,
    pub traceability: Traceability,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FlowOfFundsTrace {
    pub fn final_hop(&self) -> Option<&FlowHop> {
        self.path.last()
    }
}

/// Single-hop trace built from the source transaction alone
pub fn trace_from_transaction(investigation_id: &str, source: &Transaction) -> FlowOfFundsTrace {
    let entity = source
        .counterparty
        .as_deref()
        .or_else(|| source.description_text())
        .unwrap_or(UNKNOWN)
        .to_string();

    let hop = FlowHop {
        step: 1,
        account: source.account.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        entity: entity.clone(),
        amount: source.abs_amount(),
        date: source.date,
        method: FlowMethod::for_kind(source.kind),
    };

    let ultimate_beneficiaries = if entity == UNKNOWN { Vec::new() } else { vec![entity] };

    FlowOfFundsTrace {
        id: uuid::Uuid::new_v4().to_string(),
        investigation_id: investigation_id.to_string(),
        source_transaction_id: source.id.clone(),
        total_traced: hop.amount,
        path: vec![hop],
        ultimate_beneficiaries,
        traceability: Traceability::PartiallyTraced,
        notes: None,
        created_at: Utc::now(),
    }
}

/// Investigator-entered trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlowTrace {
    pub investigation_id: String,
    pub source_transaction_id: String,
    pub path: Vec<FlowHop>,
    /// Defaults to the amount that reached the final hop
    #[serde(default)]
    pub total_traced: Option<Decimal>,
    /// Defaults to the entity of the final hop
    #[serde(default)]
    pub ultimate_beneficiaries: Vec<String>,
    pub traceability: Traceability,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewFlowTrace {
    pub fn validate(&self) -> EngineResult<()> {
        if self.source_transaction_id.trim().is_empty() {
            return Err(EngineError::validation("Flow trace needs a source transaction id"));
        }
        if self.path.is_empty() {
            return Err(EngineError::validation("Flow trace path must contain at least one hop"));
        }
        for (index, hop) in self.path.iter().enumerate() {
            let expected = index as u32 + 1;
            if hop.step != expected {
                return Err(EngineError::validation(format!(
                    "Flow trace steps must be numbered from 1 in order: found step {} at position {}",
                    hop.step, expected
                )));
            }
            if hop.account.trim().is_empty() || hop.entity.trim().is_empty() {
                return Err(EngineError::validation(format!(
                    "Flow trace step {} needs an account and an entity",
                    hop.step
                )));
            }
            if hop.amount.is_sign_negative() {
                return Err(EngineError::validation(format!(
                    "Flow trace step {} has a negative amount",
                    hop.step
                )));
            }
        }
        if matches!(self.total_traced, Some(total) if total.is_sign_negative()) {
            return Err(EngineError::validation("Total traced amount must not be negative"));
        }
        Ok(())
    }

    pub fn into_trace(self) -> EngineResult<FlowOfFundsTrace> {
        self.validate()?;

        let last = self.path.last().cloned();
        let total_traced = self
            .total_traced
            .or_else(|| last.as_ref().map(|h| h.amount))
            .unwrap_or(Decimal::ZERO);
        let ultimate_beneficiaries = if self.ultimate_beneficiaries.is_empty() {
            last.map(|h| vec![h.entity]).unwrap_or_default()
        } else {
            self.ultimate_beneficiaries
        };

        Ok(FlowOfFundsTrace {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: self.investigation_id,
            source_transaction_id: self.source_transaction_id,
            path: self.path,
            total_traced,
            ultimate_beneficiaries,
            traceability: self.traceability,
            notes: self.notes,
            created_at: Utc::now(),
        })
    }
}
