//! SQLite persistence for the forensic engine
//!
//! Handles:
//! - Investigations (case records and lifecycle status)
//! - Evidence and chain-of-custody entries
//! - Transaction analyses, anomalies, flow traces, damage calculations
//! - Forensic reports
//! - Settings (per-tenant config overrides)
//!
//! Every child row carries `investigation_id`. Custody entries, analyses and
//! reports are append-only: triggers abort any UPDATE or DELETE, and this
//! module only exposes inserts and reads for them.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::damages::DamageCalculation;
use crate::detectors::Anomaly;
use crate::error::{EngineError, EngineResult};
use crate::evidence::{ContentHash, CustodyEntry, CustodyLog, Evidence};
use crate::flow::FlowOfFundsTrace;
use crate::investigation::{Investigation, InvestigationStatus};
use crate::report::ForensicReport;
use crate::scoring::TransactionAnalysis;

const TENANT_CONFIG_PREFIX: &str = "tenant_config:";

/// Database connection wrapper for thread-safe access
pub struct Database {
    conn: Mutex<Connection>,
}

// ============================================================================
// Column helpers
// ============================================================================

/// Text column parsed through `FromStr` (decimals, enum tags)
fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    T::from_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_opt<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| T::from_str(&t).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))))
        .transpose()
}

/// JSON-encoded text column
fn json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> EngineResult<String> {
    Ok(serde_json::to_string(value)?)
}

// ============================================================================
// Row mappers
// ============================================================================

const INVESTIGATION_COLUMNS: &str = "id, case_number, title, allegations, period_start, period_end, status, \
     owner_id, lead_investigator, metadata, created_at, updated_at";

fn investigation_from_row(row: &Row<'_>) -> rusqlite::Result<Investigation> {
    Ok(Investigation {
        id: row.get(0)?,
        case_number: row.get(1)?,
        title: row.get(2)?,
        allegations: row.get(3)?,
        period_start: row.get(4)?,
        period_end: row.get(5)?,
        status: parsed(row, 6)?,
        owner_id: row.get(7)?,
        lead_investigator: row.get(8)?,
        metadata: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const EVIDENCE_COLUMNS: &str = "id, investigation_id, evidence_number, evidence_type, description, source, \
     date_received, collected_by, storage_location, hash_algorithm, hash_value, created_at";

fn evidence_from_row(row: &Row<'_>) -> rusqlite::Result<Evidence> {
    let algorithm = parsed_opt(row, 9)?;
    let value: Option<String> = row.get(10)?;
    let content_hash = match (algorithm, value) {
        (Some(algorithm), Some(value)) => Some(ContentHash { algorithm, value }),
        _ => None,
    };
    Ok(Evidence {
        id: row.get(0)?,
        investigation_id: row.get(1)?,
        evidence_number: row.get(2)?,
        evidence_type: parsed(row, 3)?,
        description: row.get(4)?,
        source: row.get(5)?,
        date_received: row.get(6)?,
        collected_by: row.get(7)?,
        storage_location: row.get(8)?,
        content_hash,
        custody_log: CustodyLog::default(),
        created_at: row.get(11)?,
    })
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionAnalysis> {
    Ok(TransactionAnalysis {
        id: row.get(0)?,
        investigation_id: row.get(1)?,
        transaction_id: row.get(2)?,
        transaction_date: row.get(3)?,
        transaction_amount: parsed(row, 4)?,
        transaction_description: row.get(5)?,
        risk_level: parsed(row, 6)?,
        legitimacy_assessment: parsed(row, 7)?,
        red_flags: json(row, 8)?,
        score: row.get(9)?,
        analyzed_at: row.get(10)?,
    })
}

fn anomaly_from_row(row: &Row<'_>) -> rusqlite::Result<Anomaly> {
    Ok(Anomaly {
        id: row.get(0)?,
        investigation_id: row.get(1)?,
        anomaly_type: parsed(row, 2)?,
        severity: parsed(row, 3)?,
        description: row.get(4)?,
        detection_method: row.get(5)?,
        affected_transactions: json(row, 6)?,
        status: parsed(row, 7)?,
        detected_at: row.get(8)?,
    })
}

fn flow_trace_from_row(row: &Row<'_>) -> rusqlite::Result<FlowOfFundsTrace> {
    Ok(FlowOfFundsTrace {
        id: row.get(0)?,
        investigation_id: row.get(1)?,
        source_transaction_id: row.get(2)?,
        path: json(row, 3)?,
        total_traced: parsed(row, 4)?,
        ultimate_beneficiaries: json(row, 5)?,
        traceability: parsed(row, 6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn damage_from_row(row: &Row<'_>) -> rusqlite::Result<DamageCalculation> {
    Ok(DamageCalculation {
        id: row.get(0)?,
        investigation_id: row.get(1)?,
        method: parsed(row, 2)?,
        total_damage: parsed(row, 3)?,
        breakdown: json(row, 4)?,
        confidence_level: parsed(row, 5)?,
        assumptions: json(row, 6)?,
        limitations: json(row, 7)?,
        created_at: row.get(8)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ForensicReport> {
    Ok(ForensicReport {
        id: row.get(0)?,
        investigation_id: row.get(1)?,
        report_type: parsed(row, 2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        generated_by: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn load_custody(conn: &Connection, evidence_id: &str) -> EngineResult<CustodyLog> {
    let mut stmt = conn.prepare(
        "SELECT transferred_to, transferred_by, timestamp, location, purpose
         FROM custody_entries WHERE evidence_id = ?1 ORDER BY seq",
    )?;
    let entries = stmt
        .query_map(params![evidence_id], |row| {
            Ok(CustodyEntry {
                transferred_to: row.get(0)?,
                transferred_by: row.get(1)?,
                timestamp: row.get(2)?,
                location: row.get(3)?,
                purpose: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CustodyLog::from_entries(entries))
}

// ============================================================================
// Database Implementation
// ============================================================================

impl Database {
    /// Open (or create) the database file at `db_path`
    pub fn open(db_path: &Path) -> EngineResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening forensic database at: {}", db_path.display());
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Private in-memory database (tests, one-shot CLI runs)
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| EngineError::LockPoisoned)
    }

    /// Create all tables if they don't exist
    fn init_schema(&self) -> EngineResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS investigations (
                id TEXT PRIMARY KEY,
                case_number TEXT NOT NULL,
                title TEXT NOT NULL,
                allegations TEXT,
                period_start TEXT,
                period_end TEXT,
                status TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                lead_investigator TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS evidence (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                evidence_number TEXT NOT NULL,
                evidence_type TEXT NOT NULL,
                description TEXT NOT NULL,
                source TEXT,
                date_received TEXT,
                collected_by TEXT,
                storage_location TEXT,
                hash_algorithm TEXT,
                hash_value TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(investigation_id, evidence_number)
            );

            -- Chain of custody (append-only)
            CREATE TABLE IF NOT EXISTS custody_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                evidence_id TEXT NOT NULL REFERENCES evidence(id),
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                transferred_to TEXT NOT NULL,
                transferred_by TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                location TEXT,
                purpose TEXT NOT NULL
            );

            -- Scorer verdicts (append-only)
            CREATE TABLE IF NOT EXISTS transaction_analyses (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                transaction_id TEXT NOT NULL,
                transaction_date TEXT,
                transaction_amount TEXT NOT NULL,
                transaction_description TEXT,
                risk_level TEXT NOT NULL,
                legitimacy_assessment TEXT NOT NULL,
                red_flags TEXT NOT NULL,
                score INTEGER NOT NULL,
                analyzed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS anomalies (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                anomaly_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                description TEXT NOT NULL,
                detection_method TEXT NOT NULL,
                affected_transactions TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                detected_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS flow_traces (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                source_transaction_id TEXT NOT NULL,
                path TEXT NOT NULL,
                total_traced TEXT NOT NULL,
                ultimate_beneficiaries TEXT NOT NULL,
                traceability TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS damage_calculations (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                method TEXT NOT NULL,
                total_damage TEXT NOT NULL,
                breakdown TEXT NOT NULL,
                confidence_level TEXT NOT NULL,
                assumptions TEXT NOT NULL,
                limitations TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Reports (append-only; new versions are new rows)
            CREATE TABLE IF NOT EXISTS forensic_reports (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL REFERENCES investigations(id),
                report_type TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                generated_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TRIGGER IF NOT EXISTS custody_entries_no_update BEFORE UPDATE ON custody_entries
            BEGIN SELECT RAISE(ABORT, 'custody_entries is append-only'); END;
            CREATE TRIGGER IF NOT EXISTS custody_entries_no_delete BEFORE DELETE ON custody_entries
            BEGIN SELECT RAISE(ABORT, 'custody_entries is append-only'); END;
            CREATE TRIGGER IF NOT EXISTS transaction_analyses_no_update BEFORE UPDATE ON transaction_analyses
            BEGIN SELECT RAISE(ABORT, 'transaction_analyses is append-only'); END;
            CREATE TRIGGER IF NOT EXISTS transaction_analyses_no_delete BEFORE DELETE ON transaction_analyses
            BEGIN SELECT RAISE(ABORT, 'transaction_analyses is append-only'); END;
            CREATE TRIGGER IF NOT EXISTS forensic_reports_no_update BEFORE UPDATE ON forensic_reports
            BEGIN SELECT RAISE(ABORT, 'forensic_reports is append-only'); END;
            CREATE TRIGGER IF NOT EXISTS forensic_reports_no_delete BEFORE DELETE ON forensic_reports
            BEGIN SELECT RAISE(ABORT, 'forensic_reports is append-only'); END;

            CREATE INDEX IF NOT EXISTS idx_investigations_owner ON investigations(owner_id);
            CREATE INDEX IF NOT EXISTS idx_evidence_investigation ON evidence(investigation_id);
            CREATE INDEX IF NOT EXISTS idx_custody_evidence ON custody_entries(evidence_id);
            CREATE INDEX IF NOT EXISTS idx_analyses_investigation ON transaction_analyses(investigation_id);
            CREATE INDEX IF NOT EXISTS idx_anomalies_investigation ON anomalies(investigation_id);
            CREATE INDEX IF NOT EXISTS idx_flow_traces_investigation ON flow_traces(investigation_id);
            CREATE INDEX IF NOT EXISTS idx_damages_investigation ON damage_calculations(investigation_id);
            CREATE INDEX IF NOT EXISTS idx_reports_investigation ON forensic_reports(investigation_id);
        "#,
        )?;

        debug!("Forensic schema ready");
        Ok(())
    }

    // ========================================================================
    // Investigation Operations
    // ========================================================================

    pub fn insert_investigation(&self, inv: &Investigation) -> EngineResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO investigations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                INVESTIGATION_COLUMNS
            ),
            params![
                inv.id,
                inv.case_number,
                inv.title,
                inv.allegations,
                inv.period_start,
                inv.period_end,
                inv.status.as_str(),
                inv.owner_id,
                inv.lead_investigator,
                inv.metadata,
                inv.created_at,
                inv.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_investigation(&self, id: &str) -> EngineResult<Option<Investigation>> {
        let conn = self.conn()?;
        let inv = conn
            .query_row(
                &format!("SELECT {} FROM investigations WHERE id = ?1", INVESTIGATION_COLUMNS),
                params![id],
                investigation_from_row,
            )
            .optional()?;
        Ok(inv)
    }

    pub fn list_investigations(&self, owner_id: &str) -> EngineResult<Vec<Investigation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM investigations WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
            INVESTIGATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner_id], investigation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns false when no investigation has this id
    pub fn update_investigation_status(
        &self,
        id: &str,
        status: InvestigationStatus,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE investigations SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), updated_at, id],
        )?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Evidence Operations
    // ========================================================================

    /// Insert an evidence row together with any custody entries it already carries
    pub fn insert_evidence(&self, ev: &Evidence) -> EngineResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO evidence ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                EVIDENCE_COLUMNS
            ),
            params![
                ev.id,
                ev.investigation_id,
                ev.evidence_number,
                ev.evidence_type.as_str(),
                ev.description,
                ev.source,
                ev.date_received,
                ev.collected_by,
                ev.storage_location,
                ev.content_hash.as_ref().map(|h| h.algorithm.as_str()),
                ev.content_hash.as_ref().map(|h| h.value.as_str()),
                ev.created_at,
            ],
        )?;
        for entry in ev.custody_log.iter() {
            insert_custody(&tx, &ev.id, &ev.investigation_id, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn evidence_number_exists(&self, investigation_id: &str, evidence_number: &str) -> EngineResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM evidence WHERE investigation_id = ?1 AND evidence_number = ?2",
            params![investigation_id, evidence_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_evidence_by_id(&self, evidence_id: &str) -> EngineResult<Option<Evidence>> {
        let conn = self.conn()?;
        let evidence = conn
            .query_row(
                &format!("SELECT {} FROM evidence WHERE id = ?1", EVIDENCE_COLUMNS),
                params![evidence_id],
                evidence_from_row,
            )
            .optional()?;

        match evidence {
            Some(mut ev) => {
                ev.custody_log = load_custody(&conn, &ev.id)?;
                Ok(Some(ev))
            }
            None => Ok(None),
        }
    }

    /// All evidence of an investigation, each with its full custody log
    pub fn list_evidence(&self, investigation_id: &str) -> EngineResult<Vec<Evidence>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evidence WHERE investigation_id = ?1 ORDER BY created_at, rowid",
            EVIDENCE_COLUMNS
        ))?;
        let mut items = stmt
            .query_map(params![investigation_id], evidence_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for ev in items.iter_mut() {
            ev.custody_log = load_custody(&conn, &ev.id)?;
        }
        Ok(items)
    }

    pub fn append_custody_entry(
        &self,
        evidence_id: &str,
        investigation_id: &str,
        entry: &CustodyEntry,
    ) -> EngineResult<()> {
        let conn = self.conn()?;
        insert_custody(&conn, evidence_id, investigation_id, entry)
    }

    // ========================================================================
    // Analysis Operations
    // ========================================================================

    /// Insert a batch of analyses atomically
    pub fn insert_analyses(&self, analyses: &[TransactionAnalysis]) -> EngineResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transaction_analyses (id, investigation_id, transaction_id, transaction_date,
                    transaction_amount, transaction_description, risk_level, legitimacy_assessment,
                    red_flags, score, analyzed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for a in analyses {
                stmt.execute(params![
                    a.id,
                    a.investigation_id,
                    a.transaction_id,
                    a.transaction_date,
                    a.transaction_amount.to_string(),
                    a.transaction_description,
                    a.risk_level.as_str(),
                    a.legitimacy_assessment.as_str(),
                    to_json(&a.red_flags)?,
                    a.score,
                    a.analyzed_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_analyses(&self, investigation_id: &str) -> EngineResult<Vec<TransactionAnalysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, investigation_id, transaction_id, transaction_date, transaction_amount,
                    transaction_description, risk_level, legitimacy_assessment, red_flags, score, analyzed_at
             FROM transaction_analyses WHERE investigation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![investigation_id], analysis_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ========================================================================
    // Anomaly Operations
    // ========================================================================

    pub fn insert_anomalies(&self, anomalies: &[Anomaly]) -> EngineResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO anomalies (id, investigation_id, anomaly_type, severity, description,
                    detection_method, affected_transactions, status, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for a in anomalies {
                stmt.execute(params![
                    a.id,
                    a.investigation_id,
                    a.anomaly_type.as_str(),
                    a.severity.as_str(),
                    a.description,
                    a.detection_method,
                    to_json(&a.affected_transactions)?,
                    a.status.as_str(),
                    a.detected_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_anomalies(&self, investigation_id: &str) -> EngineResult<Vec<Anomaly>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, investigation_id, anomaly_type, severity, description, detection_method,
                    affected_transactions, status, detected_at
             FROM anomalies WHERE investigation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![investigation_id], anomaly_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ========================================================================
    // Flow Trace Operations
    // ========================================================================

    pub fn insert_flow_trace(&self, trace: &FlowOfFundsTrace) -> EngineResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO flow_traces (id, investigation_id, source_transaction_id, path, total_traced,
                ultimate_beneficiaries, traceability, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trace.id,
                trace.investigation_id,
                trace.source_transaction_id,
                to_json(&trace.path)?,
                trace.total_traced.to_string(),
                to_json(&trace.ultimate_beneficiaries)?,
                trace.traceability.as_str(),
                trace.notes,
                trace.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_flow_traces(&self, investigation_id: &str) -> EngineResult<Vec<FlowOfFundsTrace>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, investigation_id, source_transaction_id, path, total_traced,
                    ultimate_beneficiaries, traceability, notes, created_at
             FROM flow_traces WHERE investigation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![investigation_id], flow_trace_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ========================================================================
    // Damage Operations
    // ========================================================================

    pub fn insert_damage_calculation(&self, calc: &DamageCalculation) -> EngineResult<()> {
        let investigation_id = calc
            .investigation_id
            .as_deref()
            .ok_or_else(|| EngineError::validation("Only investigation-scoped damage calculations are stored"))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO damage_calculations (id, investigation_id, method, total_damage, breakdown,
                confidence_level, assumptions, limitations, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                calc.id,
                investigation_id,
                calc.method.as_str(),
                calc.total_damage.to_string(),
                to_json(&calc.breakdown)?,
                calc.confidence_level.as_str(),
                to_json(&calc.assumptions)?,
                to_json(&calc.limitations)?,
                calc.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_damage_calculations(&self, investigation_id: &str) -> EngineResult<Vec<DamageCalculation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, investigation_id, method, total_damage, breakdown, confidence_level,
                    assumptions, limitations, created_at
             FROM damage_calculations WHERE investigation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![investigation_id], damage_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ========================================================================
    // Report Operations
    // ========================================================================

    pub fn insert_report(&self, report: &ForensicReport) -> EngineResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO forensic_reports (id, investigation_id, report_type, title, content, generated_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.id,
                report.investigation_id,
                report.report_type.as_str(),
                report.title,
                report.content,
                report.generated_by,
                report.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_report(&self, report_id: &str) -> EngineResult<Option<ForensicReport>> {
        let conn = self.conn()?;
        let report = conn
            .query_row(
                "SELECT id, investigation_id, report_type, title, content, generated_by, created_at
                 FROM forensic_reports WHERE id = ?1",
                params![report_id],
                report_from_row,
            )
            .optional()?;
        Ok(report)
    }

    pub fn list_reports(&self, investigation_id: &str) -> EngineResult<Vec<ForensicReport>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, investigation_id, report_type, title, content, generated_by, created_at
             FROM forensic_reports WHERE investigation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![investigation_id], report_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ========================================================================
    // Settings Operations
    // ========================================================================

    pub fn get_setting(&self, key: &str) -> EngineResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> EngineResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Config override stored for one owner, if any
    pub fn tenant_config(&self, owner_id: &str) -> EngineResult<Option<EngineConfig>> {
        match self.get_setting(&format!("{}{}", TENANT_CONFIG_PREFIX, owner_id))? {
            Some(json) => Ok(Some(EngineConfig::from_json(&json)?)),
            None => Ok(None),
        }
    }

    pub fn set_tenant_config(&self, owner_id: &str, config: &EngineConfig) -> EngineResult<()> {
        config.validate()?;
        self.set_setting(&format!("{}{}", TENANT_CONFIG_PREFIX, owner_id), &config.to_json()?)
    }
}

fn insert_custody(conn: &Connection, evidence_id: &str, investigation_id: &str, entry: &CustodyEntry) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO custody_entries (evidence_id, investigation_id, transferred_to, transferred_by, timestamp, location, purpose)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            evidence_id,
            investigation_id,
            entry.transferred_to,
            entry.transferred_by,
            entry.timestamp,
            entry.location,
            entry.purpose,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damages::direct_loss;
    use crate::evidence::{EvidenceType, HashAlgorithm, NewCustodyEntry};
    use crate::investigation::NewInvestigation;
    use crate::report::{NewForensicReport, ReportType};
    use crate::scoring::RiskScorer;
    use crate::transaction::{Transaction, TransactionKind};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn db_with_case() -> (Database, Investigation) {
        let db = Database::open_in_memory().unwrap();
        let inv = NewInvestigation::titled("Procurement fraud")
            .into_investigation("owner-1")
            .unwrap();
        db.insert_investigation(&inv).unwrap();
        (db, inv)
    }

    fn evidence(inv: &Investigation, number: &str) -> Evidence {
        Evidence {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: inv.id.clone(),
            evidence_number: number.to_string(),
            evidence_type: EvidenceType::Invoice,
            description: "Vendor invoice".to_string(),
            source: Some("AP system".to_string()),
            date_received: None,
            collected_by: Some("j.doe".to_string()),
            storage_location: None,
            content_hash: Some(ContentHash {
                algorithm: HashAlgorithm::Sha256,
                value: "ab".repeat(32),
            }),
            custody_log: CustodyLog::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_investigation_round_trip() {
        let (db, inv) = db_with_case();
        let loaded = db.get_investigation(&inv.id).unwrap().unwrap();
        assert_eq!(loaded.title, inv.title);
        assert_eq!(loaded.status, InvestigationStatus::Open);
        assert_eq!(db.list_investigations("owner-1").unwrap().len(), 1);
        assert!(db.list_investigations("someone-else").unwrap().is_empty());
        assert!(db.get_investigation("missing").unwrap().is_none());
    }

    #[test]
    fn test_status_update() {
        let (db, inv) = db_with_case();
        assert!(db
            .update_investigation_status(&inv.id, InvestigationStatus::InProgress, Utc::now())
            .unwrap());
        assert!(!db
            .update_investigation_status("missing", InvestigationStatus::InProgress, Utc::now())
            .unwrap());
        let loaded = db.get_investigation(&inv.id).unwrap().unwrap();
        assert_eq!(loaded.status, InvestigationStatus::InProgress);
    }

    #[test]
    fn test_evidence_and_custody_order() {
        let (db, inv) = db_with_case();
        let ev = evidence(&inv, "E-001");
        db.insert_evidence(&ev).unwrap();
        assert!(db.evidence_number_exists(&inv.id, "E-001").unwrap());
        assert!(!db.evidence_number_exists(&inv.id, "E-002").unwrap());

        for to in ["lab", "vault", "counsel"] {
            let entry = NewCustodyEntry::new(to, "intake", "transfer").into_entry().unwrap();
            db.append_custody_entry(&ev.id, &inv.id, &entry).unwrap();
        }

        let loaded = db.get_evidence_by_id(&ev.id).unwrap().unwrap();
        let holders: Vec<_> = loaded.custody_log.iter().map(|e| e.transferred_to.as_str()).collect();
        assert_eq!(holders, vec!["lab", "vault", "counsel"]);
        assert_eq!(loaded.content_hash, ev.content_hash);
        assert_eq!(db.list_evidence(&inv.id).unwrap()[0].custody_log.len(), 3);
    }

    #[test]
    fn test_duplicate_evidence_number_rejected_by_schema() {
        let (db, inv) = db_with_case();
        db.insert_evidence(&evidence(&inv, "E-001")).unwrap();
        assert!(db.insert_evidence(&evidence(&inv, "E-001")).is_err());
    }

    #[test]
    fn test_append_only_tables_reject_updates_and_deletes() {
        let (db, inv) = db_with_case();
        let ev = evidence(&inv, "E-001");
        db.insert_evidence(&ev).unwrap();
        let entry = NewCustodyEntry::new("lab", "intake", "imaging").into_entry().unwrap();
        db.append_custody_entry(&ev.id, &inv.id, &entry).unwrap();

        let conn = db.conn().unwrap();
        assert!(conn.execute("UPDATE custody_entries SET transferred_to = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM custody_entries", []).is_err());
    }

    #[test]
    fn test_analyses_keep_exact_amounts() {
        let (db, inv) = db_with_case();
        let scorer = RiskScorer::new(Default::default()).unwrap();
        let tx = Transaction::new("t1", dec!(-1234.567), TransactionKind::Expense).with_description("misc");
        let analysis = TransactionAnalysis::record(&inv.id, &tx, &scorer.score(&tx));
        db.insert_analyses(std::slice::from_ref(&analysis)).unwrap();

        let loaded = db.list_analyses(&inv.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].transaction_amount, dec!(-1234.567));
        assert_eq!(loaded[0].red_flags, analysis.red_flags);

        let conn = db.conn().unwrap();
        assert!(conn.execute("UPDATE transaction_analyses SET score = 0", []).is_err());
    }

    #[test]
    fn test_damage_and_report_round_trip() {
        let (db, inv) = db_with_case();
        let txs = vec![Transaction::new("t1", dec!(-500.25), TransactionKind::Expense)];
        let calc = direct_loss(&txs).unwrap().for_investigation(&inv.id);
        db.insert_damage_calculation(&calc).unwrap();
        assert_eq!(db.list_damage_calculations(&inv.id).unwrap(), vec![calc]);

        let report = NewForensicReport::new(&inv.id, ReportType::Custom, "Memo", "Body", "analyst")
            .into_report()
            .unwrap();
        db.insert_report(&report).unwrap();
        assert_eq!(db.get_report(&report.id).unwrap().unwrap(), report);

        let conn = db.conn().unwrap();
        assert!(conn.execute("DELETE FROM forensic_reports", []).is_err());
    }

    #[test]
    fn test_unscoped_damage_calculation_not_stored() {
        let (db, _) = db_with_case();
        let txs = vec![Transaction::new("t1", dec!(10), TransactionKind::Expense)];
        let calc = direct_loss(&txs).unwrap();
        assert!(matches!(db.insert_damage_calculation(&calc), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_tenant_config_override() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.tenant_config("owner-1").unwrap().is_none());

        let mut config = EngineConfig::default();
        config.scoring.large_amount_threshold = dec!(10000);
        db.set_tenant_config("owner-1", &config).unwrap();
        assert_eq!(db.tenant_config("owner-1").unwrap(), Some(config));
        assert!(db.tenant_config("owner-2").unwrap().is_none());
    }
}
