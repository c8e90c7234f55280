//! Evidence records and the chain-of-custody log

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hash::HashAlgorithm;
use crate::error::{EngineError, EngineResult};

/// Kinds of evidentiary artifacts collected in a financial investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Document,
    BankStatement,
    Invoice,
    Receipt,
    Email,
    Contract,
    LedgerExport,
    DigitalFile,
    Testimony,
    Other,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Document => "document",
            EvidenceType::BankStatement => "bank_statement",
            EvidenceType::Invoice => "invoice",
            EvidenceType::Receipt => "receipt",
            EvidenceType::Email => "email",
            EvidenceType::Contract => "contract",
            EvidenceType::LedgerExport => "ledger_export",
            EvidenceType::DigitalFile => "digital_file",
            EvidenceType::Testimony => "testimony",
            EvidenceType::Other => "other",
        }
    }
}

impl FromStr for EvidenceType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(EvidenceType::Document),
            "bank_statement" => Ok(EvidenceType::BankStatement),
            "invoice" => Ok(EvidenceType::Invoice),
            "receipt" => Ok(EvidenceType::Receipt),
            "email" => Ok(EvidenceType::Email),
            "contract" => Ok(EvidenceType::Contract),
            "ledger_export" => Ok(EvidenceType::LedgerExport),
            "digital_file" => Ok(EvidenceType::DigitalFile),
            "testimony" => Ok(EvidenceType::Testimony),
            "other" => Ok(EvidenceType::Other),
            other => Err(EngineError::validation(format!("Unknown evidence type '{}'", other))),
        }
    }
}

/// Digest of a file-backed evidence item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

/// One hand-off in the chain of custody
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEntry {
    pub transferred_to: String,
    pub transferred_by: String,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub purpose: String,
}

/// Ordered, append-only custody history.
///
/// There is no way to edit or remove an entry through this type: it can only
/// be read, and new entries are appended by the evidence ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CustodyLog {
    entries: Vec<CustodyEntry>,
}

impl CustodyLog {
    pub(crate) fn from_entries(entries: Vec<CustodyEntry>) -> Self {
        Self { entries }
    }

    pub(crate) fn append(&mut self, entry: CustodyEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CustodyEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustodyEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current custodian, if the item has changed hands at least once
    pub fn current_custodian(&self) -> Option<&str> {
        self.entries.last().map(|e| e.transferred_to.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub id: String,
    pub investigation_id: String,
    /// Unique within the investigation
    pub evidence_number: String,
    pub evidence_type: EvidenceType,
    pub description: String,
    pub source: Option<String>,
    pub date_received: Option<DateTime<Utc>>,
    pub collected_by: Option<String>,
    pub storage_location: Option<String>,
    pub content_hash: Option<ContentHash>,
    pub custody_log: CustodyLog,
    pub created_at: DateTime<Utc>,
}

/// Input for registering an evidence item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
    pub investigation_id: String,
    pub evidence_number: String,
    pub evidence_type: EvidenceType,
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub date_received: Option<DateTime<Utc>>,
    #[serde(default)]
    pub collected_by: Option<String>,
    #[serde(default)]
    pub storage_location: Option<String>,
    /// File to hash on registration
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Digest computed elsewhere (ignored when `file_path` is set)
    #[serde(default)]
    pub content_hash: Option<ContentHash>,
}

impl NewEvidence {
    pub fn new(
        investigation_id: impl Into<String>,
        evidence_number: impl Into<String>,
        evidence_type: EvidenceType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            evidence_number: evidence_number.into(),
            evidence_type,
            description: description.into(),
            source: None,
            date_received: None,
            collected_by: None,
            storage_location: None,
            file_path: None,
            hash_algorithm: None,
            content_hash: None,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.evidence_number.trim().is_empty() {
            return Err(EngineError::validation("Evidence number is required"));
        }
        if self.description.trim().is_empty() {
            return Err(EngineError::validation("Evidence description is required"));
        }
        Ok(())
    }
}

/// Input for a custody hand-off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustodyEntry {
    pub transferred_to: String,
    pub transferred_by: String,
    #[serde(default)]
    pub location: Option<String>,
    pub purpose: String,
    /// Defaults to the time of recording
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewCustodyEntry {
    pub fn new(
        transferred_to: impl Into<String>,
        transferred_by: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            transferred_to: transferred_to.into(),
            transferred_by: transferred_by.into(),
            location: None,
            purpose: purpose.into(),
            timestamp: None,
        }
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn into_entry(self) -> EngineResult<CustodyEntry> {
        let mut missing = Vec::new();
        if self.transferred_to.trim().is_empty() {
            missing.push("transferred_to");
        }
        if self.transferred_by.trim().is_empty() {
            missing.push("transferred_by");
        }
        if self.purpose.trim().is_empty() {
            missing.push("purpose");
        }
        if !missing.is_empty() {
            return Err(EngineError::validation(format!(
                "Custody entry is missing: {}",
                missing.join(", ")
            )));
        }

        Ok(CustodyEntry {
            transferred_to: self.transferred_to,
            transferred_by: self.transferred_by,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            location: self.location,
            purpose: self.purpose,
        })
    }
}

/// Outcome of re-hashing an evidence file against its recorded digest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityCheck {
    pub evidence_id: String,
    pub algorithm: HashAlgorithm,
    pub expected: String,
    pub actual: String,
    pub matches: bool,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(to: &str) -> CustodyEntry {
        NewCustodyEntry::new(to, "intake", "analysis").into_entry().unwrap()
    }

    #[test]
    fn test_custody_log_preserves_order() {
        let mut log = CustodyLog::default();
        log.append(entry("analyst-a"));
        log.append(entry("analyst-b"));
        log.append(entry("vault"));

        assert_eq!(log.len(), 3);
        let custodians: Vec<_> = log.iter().map(|e| e.transferred_to.as_str()).collect();
        assert_eq!(custodians, vec!["analyst-a", "analyst-b", "vault"]);
        assert_eq!(log.current_custodian(), Some("vault"));
    }

    #[test]
    fn test_custody_entry_requires_parties_and_purpose() {
        let err = NewCustodyEntry::new("", "intake", " ").into_entry().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("transferred_to"));
        assert!(message.contains("purpose"));
        assert!(!message.contains("transferred_by"));
    }

    #[test]
    fn test_new_evidence_validation() {
        let ev = NewEvidence::new("inv", " ", EvidenceType::Invoice, "Invoice 1043");
        assert!(ev.validate().is_err());
        let ev = NewEvidence::new("inv", "E-001", EvidenceType::Invoice, "Invoice 1043");
        assert!(ev.validate().is_ok());
    }

    #[test]
    fn test_evidence_type_text() {
        assert_eq!("bank_statement".parse::<EvidenceType>().unwrap(), EvidenceType::BankStatement);
        assert_eq!(EvidenceType::LedgerExport.as_str(), "ledger_export");
    }
}
