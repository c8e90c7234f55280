//! Forensic financial analysis engine
//!
//! Scores ledger transactions for fraud risk, runs batch anomaly detectors,
//! keeps a tamper-evident evidence ledger with chain of custody, traces
//! flows of funds, quantifies damages and renders case reports. All state is
//! scoped to an investigation and gated by an [`access::AccessPolicy`].

pub mod access;
pub mod audit;
pub mod config;
pub mod damages;
pub mod database;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod flow;
pub mod investigation;
pub mod logging;
pub mod report;
pub mod scoring;
pub mod transaction;

pub use access::{AccessPolicy, Caller, OwnerOnly};
pub use config::EngineConfig;
pub use database::Database;
pub use engine::ForensicEngine;
pub use error::{EngineError, EngineResult};
pub use investigation::{Investigation, InvestigationStatus, NewInvestigation};
pub use transaction::{InMemoryLedger, Transaction, TransactionKind, TransactionSource};
