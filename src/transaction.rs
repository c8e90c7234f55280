//! Normalized ledger transactions and the seam to the external ledger store
//!
//! The engine never fetches transactions itself: a [`TransactionSource`]
//! hands it an immutable snapshot per owner, and nothing is ever written back.
//! [`InMemoryLedger`] is the mocked source used by tests and the CLI.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Direction of a transaction as reported by the source ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" | "credit" => Ok(TransactionKind::Income),
            "expense" | "debit" => Ok(TransactionKind::Expense),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(EngineError::validation(format!(
                "Unknown transaction type '{}'. Expected income, expense or transfer",
                other
            ))),
        }
    }
}

/// A normalized ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Account the money moved through, when the ledger knows it
    #[serde(default)]
    pub account: Option<String>,
    /// Payee or payer named by the ledger
    #[serde(default)]
    pub counterparty: Option<String>,
}

impl Transaction {
    pub fn new(id: impl Into<String>, amount: Decimal, kind: TransactionKind) -> Self {
        Self {
            id: id.into(),
            amount,
            date: None,
            description: None,
            kind,
            account: None,
            counterparty: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }

    /// Whole-dollar amount at or above `minimum`
    pub fn is_round_dollar(&self, minimum: Decimal) -> bool {
        let abs = self.abs_amount();
        abs.fract().is_zero() && abs >= minimum
    }

    /// Calendar day of the transaction (UTC)
    pub fn day(&self) -> Option<NaiveDate> {
        self.date.map(|d| d.date_naive())
    }

    /// Description text, treating blank descriptions as missing
    pub fn description_text(&self) -> Option<&str> {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }

    /// Parse a JSON body of untyped transaction objects into validated records.
    ///
    /// Anything the engine cannot interpret exactly becomes a validation error
    /// naming the offending element; nothing is coerced silently.
    pub fn parse_batch(json: &str) -> EngineResult<Vec<Transaction>> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| EngineError::validation(format!("Malformed transaction JSON: {}", e)))?;

        let items = value
            .as_array()
            .ok_or_else(|| EngineError::validation("Expected an array of transactions"))?;

        items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_transaction(index, item))
            .collect()
    }
}

fn parse_transaction(index: usize, item: &Value) -> EngineResult<Transaction> {
    let obj = item.as_object().ok_or_else(|| {
        EngineError::validation(format!("Transaction #{} is not an object", index))
    })?;

    let id = match obj.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(EngineError::validation(format!(
                "Transaction #{} has a missing or blank id",
                index
            )))
        }
    };

    let amount = match obj.get("amount") {
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(Value::String(s)) => parse_decimal(s.trim()),
        _ => None,
    }
    .ok_or_else(|| {
        EngineError::validation(format!("Transaction {} has a missing or non-numeric amount", id))
    })?;

    let date = match obj.get("date") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(parse_date(s).ok_or_else(|| {
            EngineError::validation(format!("Transaction {} has an unparseable date '{}'", id, s))
        })?),
        Some(_) => {
            return Err(EngineError::validation(format!(
                "Transaction {} date must be a string",
                id
            )))
        }
    };

    let kind = match obj.get("type") {
        Some(Value::String(s)) => s.parse()?,
        None | Some(Value::Null) if amount.is_sign_negative() => TransactionKind::Expense,
        None | Some(Value::Null) => TransactionKind::Income,
        Some(_) => {
            return Err(EngineError::validation(format!(
                "Transaction {} type must be a string",
                id
            )))
        }
    };

    Ok(Transaction {
        id,
        amount,
        date,
        description: optional_text(obj.get("description")),
        kind,
        account: optional_text(obj.get("account")),
        counterparty: optional_text(obj.get("counterparty")),
    })
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC)
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// External ledger seam
// =============================================================================

/// Read-only access to the external ledger store
pub trait TransactionSource: Send + Sync {
    /// Every transaction owned by `owner_id`, in ledger order
    fn transactions_for_owner(&self, owner_id: &str) -> EngineResult<Vec<Transaction>>;

    /// A single transaction, scoped to its owner
    fn transaction(&self, owner_id: &str, transaction_id: &str) -> EngineResult<Option<Transaction>>;
}

/// Mock ledger holding transactions in memory, keyed by owner
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    by_owner: HashMap<String, Vec<Transaction>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner_id: impl Into<String>, transaction: Transaction) {
        self.by_owner
            .entry(owner_id.into())
            .or_default()
            .push(transaction);
    }

    pub fn extend(&mut self, owner_id: impl Into<String>, transactions: impl IntoIterator<Item = Transaction>) {
        self.by_owner
            .entry(owner_id.into())
            .or_default()
            .extend(transactions);
    }

    /// Load a JSON array of transactions for one owner
    pub fn load_json_file(&mut self, owner_id: &str, path: &Path) -> EngineResult<usize> {
        let json = fs::read_to_string(path)?;
        let transactions = Transaction::parse_batch(&json)?;
        let count = transactions.len();
        info!(owner_id, count, path = %path.display(), "Loaded ledger snapshot");
        self.extend(owner_id, transactions);
        Ok(count)
    }
}

impl TransactionSource for InMemoryLedger {
    fn transactions_for_owner(&self, owner_id: &str) -> EngineResult<Vec<Transaction>> {
        let transactions = self.by_owner.get(owner_id).cloned().unwrap_or_default();
        debug!(owner_id, count = transactions.len(), "Ledger snapshot served");
        Ok(transactions)
    }

    fn transaction(&self, owner_id: &str, transaction_id: &str) -> EngineResult<Option<Transaction>> {
        Ok(self
            .by_owner
            .get(owner_id)
            .and_then(|txs| txs.iter().find(|t| t.id == transaction_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_dollar() {
        let round = Transaction::new("t1", dec!(-250), TransactionKind::Expense);
        assert!(round.is_round_dollar(dec!(100)));

        let cents = Transaction::new("t2", dec!(250.50), TransactionKind::Expense);
        assert!(!cents.is_round_dollar(dec!(100)));

        let small = Transaction::new("t3", dec!(99), TransactionKind::Expense);
        assert!(!small.is_round_dollar(dec!(100)));

        let trailing_zeros = Transaction::new("t4", dec!(100.00), TransactionKind::Expense);
        assert!(trailing_zeros.is_round_dollar(dec!(100)));
    }

    #[test]
    fn test_parse_batch_valid() {
        let json = r#"[
            {"id": "a", "amount": 125.5, "date": "2024-03-02", "description": "Office supplies", "type": "expense"},
            {"id": 7, "amount": "-40", "date": "2024-03-04T10:15:00Z"}
        ]"#;
        let txs = Transaction::parse_batch(json).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].amount, dec!(125.5));
        assert_eq!(txs[0].kind, TransactionKind::Expense);
        assert_eq!(txs[1].id, "7");
        assert_eq!(txs[1].kind, TransactionKind::Expense);
        assert!(txs[1].description.is_none());
    }

    #[test]
    fn test_parse_batch_rejects_non_array() {
        let err = Transaction::parse_batch(r#"{"id": "a"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_parse_batch_rejects_bad_amount() {
        let err = Transaction::parse_batch(r#"[{"id": "a", "amount": "lots"}]"#).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = Transaction::parse_batch(r#"[{"amount": 5}]"#).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_in_memory_ledger_scopes_by_owner() {
        let mut ledger = InMemoryLedger::new();
        ledger.insert("alice", Transaction::new("t1", dec!(10), TransactionKind::Income));
        ledger.insert("bob", Transaction::new("t2", dec!(20), TransactionKind::Income));

        assert_eq!(ledger.transactions_for_owner("alice").unwrap().len(), 1);
        assert!(ledger.transaction("alice", "t2").unwrap().is_none());
        assert!(ledger.transaction("bob", "t2").unwrap().is_some());
    }
}
