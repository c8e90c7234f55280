//! Forensic engine facade
//!
//! [`ForensicEngine`] is the API surface callers use. Every investigation-scoped
//! operation goes through [`ForensicEngine::authorize`] before it reads or
//! writes anything. The engine reads transactions from a [`TransactionSource`]
//! and never writes back to it.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::access::{AccessPolicy, Caller, OwnerOnly};
use crate::audit;
use crate::config::EngineConfig;
use crate::damages::{self, DamageCalculation, NetWorthInputs};
use crate::database::Database;
use crate::detectors::{
    analyze_benfords_law, AnalysisRunner, Anomaly, AnomalyDetectionResult, BenfordAnalysisResult, BenfordDetector,
    Budget, ComprehensiveAnalysis, Detector, DetectorReport, DuplicatePaymentDetector, RoundDollarDetector,
    SectionOutcome, UnusualTimingDetector,
};
use crate::error::{EngineError, EngineResult};
use crate::evidence::{self, Evidence, IntegrityCheck, NewCustodyEntry, NewEvidence};
use crate::flow::{self, FlowOfFundsTrace, NewFlowTrace};
use crate::investigation::{Investigation, InvestigationStatus, NewInvestigation};
use crate::logging;
use crate::report::{
    render_summary, ForensicReport, InvestigationSummary, NewForensicReport, OutputFormat, ReportType, TemplateEngine,
};
use crate::scoring::{RiskScorer, TransactionAnalysis, TransactionAnalysisResult};
use crate::transaction::{Transaction, TransactionSource};

/// Section name of the per-transaction scoring pass in a comprehensive run
pub const SCORING_SECTION: &str = "transaction_scoring";

pub struct ForensicEngine<L: TransactionSource> {
    db: Database,
    ledger: L,
    config: EngineConfig,
    policy: Box<dyn AccessPolicy>,
    templates: TemplateEngine,
}

impl<L: TransactionSource> ForensicEngine<L> {
    pub fn new(db: Database, ledger: L, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            db,
            ledger,
            config,
            policy: Box::new(OwnerOnly),
            templates: TemplateEngine::new()?,
        })
    }

    pub fn with_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_templates(mut self, templates: TemplateEngine) -> Self {
        self.templates = templates;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Effective configuration for an owner: stored override or engine default
    pub fn config_for(&self, owner_id: &str) -> EngineResult<EngineConfig> {
        Ok(self
            .db
            .tenant_config(owner_id)?
            .unwrap_or_else(|| self.config.clone()))
    }

    /// Store a config override for the caller's own investigations
    pub fn set_tenant_config(&self, caller: &Caller, config: &EngineConfig) -> EngineResult<()> {
        self.db.set_tenant_config(&caller.user_id, config)?;
        info!(owner_id = %caller.user_id, "Tenant configuration updated");
        Ok(())
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Load an investigation and check the caller may access it
    pub fn authorize(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Investigation> {
        let investigation = self
            .db
            .get_investigation(investigation_id)?
            .ok_or_else(|| EngineError::not_found("Investigation", investigation_id))?;
        self.check_access(&investigation, caller)?;
        Ok(investigation)
    }

    fn check_access(&self, investigation: &Investigation, caller: &Caller) -> EngineResult<()> {
        if self.policy.permits(investigation, caller) {
            return Ok(());
        }
        audit::log_security_event(
            "access_denied",
            "Caller does not hold access to the investigation",
            &investigation.id,
            &caller.user_id,
        );
        Err(EngineError::AccessDenied {
            investigation_id: investigation.id.clone(),
            caller_id: caller.user_id.clone(),
        })
    }

    // ========================================================================
    // Case Manager
    // ========================================================================

    pub fn create_investigation(&self, caller: &Caller, new: NewInvestigation) -> EngineResult<Investigation> {
        if caller.user_id.trim().is_empty() {
            return Err(EngineError::validation("Caller identity is required"));
        }
        let investigation = new.into_investigation(&caller.user_id)?;
        self.db.insert_investigation(&investigation)?;
        audit::log_investigation_created(&investigation.id, &investigation.case_number, &investigation.owner_id);
        Ok(investigation)
    }

    /// `None` when no such investigation exists
    pub fn get_investigation(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Option<Investigation>> {
        match self.db.get_investigation(investigation_id)? {
            Some(investigation) => {
                self.check_access(&investigation, caller)?;
                Ok(Some(investigation))
            }
            None => Ok(None),
        }
    }

    /// Investigations owned by `owner_id` that the caller may see
    pub fn list_investigations(&self, caller: &Caller, owner_id: &str) -> EngineResult<Vec<Investigation>> {
        let mut investigations = self.db.list_investigations(owner_id)?;
        investigations.retain(|inv| self.policy.permits(inv, caller));
        Ok(investigations)
    }

    pub fn update_investigation_status(
        &self,
        caller: &Caller,
        investigation_id: &str,
        status: InvestigationStatus,
    ) -> EngineResult<Investigation> {
        let investigation = self.authorize(caller, investigation_id)?;
        investigation.status.check_transition(status)?;
        if investigation.status == status {
            return Ok(investigation);
        }
        self.apply_status(caller, investigation, status)
    }

    /// Move a completed or closed case back to `in_progress`
    pub fn reopen_investigation(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Investigation> {
        let investigation = self.authorize(caller, investigation_id)?;
        let status = investigation.status.reopen()?;
        self.apply_status(caller, investigation, status)
    }

    fn apply_status(
        &self,
        caller: &Caller,
        mut investigation: Investigation,
        status: InvestigationStatus,
    ) -> EngineResult<Investigation> {
        let now = Utc::now();
        if !self.db.update_investigation_status(&investigation.id, status, now)? {
            return Err(EngineError::not_found("Investigation", investigation.id));
        }
        audit::log_status_changed(&investigation.id, investigation.status.as_str(), status.as_str(), &caller.user_id);
        investigation.status = status;
        investigation.updated_at = now;
        Ok(investigation)
    }

    // ========================================================================
    // Evidence Ledger
    // ========================================================================

    #[instrument(skip_all, fields(investigation_id = %new.investigation_id, evidence_number = %new.evidence_number))]
    pub fn add_evidence(&self, caller: &Caller, new: NewEvidence) -> EngineResult<Evidence> {
        let investigation = self.authorize(caller, &new.investigation_id)?;
        new.validate()?;

        let evidence_number = new.evidence_number.trim().to_string();
        if self.db.evidence_number_exists(&investigation.id, &evidence_number)? {
            return Err(EngineError::validation(format!(
                "Evidence number {} already exists in this investigation",
                evidence_number
            )));
        }

        let content_hash = evidence::resolve_content_hash(&new)?;
        let item = Evidence {
            id: uuid::Uuid::new_v4().to_string(),
            investigation_id: investigation.id.clone(),
            evidence_number,
            evidence_type: new.evidence_type,
            description: new.description,
            source: new.source,
            date_received: new.date_received,
            collected_by: new.collected_by,
            storage_location: new.storage_location,
            content_hash,
            custody_log: Default::default(),
            created_at: Utc::now(),
        };
        self.db.insert_evidence(&item)?;

        audit::log_evidence_added(
            &item.investigation_id,
            &item.id,
            &item.evidence_number,
            item.content_hash.as_ref().map(|h| h.value.as_str()),
        );
        Ok(item)
    }

    pub fn get_evidence(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Vec<Evidence>> {
        let investigation = self.authorize(caller, investigation_id)?;
        self.db.list_evidence(&investigation.id)
    }

    fn load_evidence(&self, caller: &Caller, evidence_id: &str) -> EngineResult<Evidence> {
        let item = self
            .db
            .get_evidence_by_id(evidence_id)?
            .ok_or_else(|| EngineError::not_found("Evidence", evidence_id))?;
        self.authorize(caller, &item.investigation_id)?;
        Ok(item)
    }

    /// Append a hand-off to the chain of custody and return the updated item
    pub fn append_custody_entry(
        &self,
        caller: &Caller,
        evidence_id: &str,
        entry: NewCustodyEntry,
    ) -> EngineResult<Evidence> {
        let mut item = self.load_evidence(caller, evidence_id)?;
        let entry = entry.into_entry()?;
        self.db.append_custody_entry(&item.id, &item.investigation_id, &entry)?;
        audit::log_custody_appended(&item.id, &entry.transferred_to, &entry.transferred_by, &entry.purpose);
        item.custody_log.append(entry);
        Ok(item)
    }

    /// Re-hash an evidence file and compare with the digest recorded at intake
    pub fn verify_evidence_integrity(
        &self,
        caller: &Caller,
        evidence_id: &str,
        path: &Path,
    ) -> EngineResult<IntegrityCheck> {
        let item = self.load_evidence(caller, evidence_id)?;
        let check = evidence::verify_integrity(&item, path)?;
        audit::log_hash_verification(
            &item.id,
            path,
            check.algorithm.as_str(),
            &check.actual,
            &check.expected,
            check.matches,
        );
        Ok(check)
    }

    // ========================================================================
    // Risk Scorer
    // ========================================================================

    fn score_all(scorer: &RiskScorer, investigation_id: &str, transactions: &[Transaction]) -> Vec<TransactionAnalysis> {
        transactions
            .par_iter()
            .map(|t| TransactionAnalysis::record(investigation_id, t, &scorer.score(t)))
            .collect()
    }

    /// Score one caller-supplied transaction and store the verdict
    pub fn analyze_transaction(
        &self,
        caller: &Caller,
        investigation_id: &str,
        transaction: &Transaction,
    ) -> EngineResult<TransactionAnalysisResult> {
        let investigation = self.authorize(caller, investigation_id)?;
        let config = self.config_for(&investigation.owner_id)?;
        let scorer = RiskScorer::new(config.scoring)?;

        let result = scorer.score(transaction);
        self.db
            .insert_analyses(&[TransactionAnalysis::record(&investigation.id, transaction, &result)])?;
        audit::log_analysis_persisted(&investigation.id, SCORING_SECTION, 1);
        Ok(result)
    }

    /// Score every ledger transaction of the investigation's owner
    #[instrument(skip(self, caller))]
    pub fn analyze_all_transactions(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<Vec<TransactionAnalysisResult>> {
        let investigation = self.authorize(caller, investigation_id)?;
        let config = self.config_for(&investigation.owner_id)?;
        let scorer = RiskScorer::new(config.scoring)?;
        let transactions = self.ledger.transactions_for_owner(&investigation.owner_id)?;

        let records = Self::score_all(&scorer, &investigation.id, &transactions);
        self.db.insert_analyses(&records)?;
        audit::log_analysis_persisted(&investigation.id, SCORING_SECTION, records.len());

        if logging::is_debug_enabled() {
            let flagged = records.iter().filter(|r| !r.red_flags.is_empty()).count();
            debug!(total = records.len(), flagged, "Transactions scored");
        }

        Ok(records
            .into_iter()
            .map(|r| TransactionAnalysisResult {
                transaction_id: r.transaction_id,
                risk_level: r.risk_level,
                legitimacy_assessment: r.legitimacy_assessment,
                red_flags: r.red_flags,
                score: r.score,
            })
            .collect())
    }

    pub fn list_analyses(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Vec<TransactionAnalysis>> {
        let investigation = self.authorize(caller, investigation_id)?;
        self.db.list_analyses(&investigation.id)
    }

    // ========================================================================
    // Anomaly Detectors
    // ========================================================================

    fn persist_findings(
        &self,
        investigation_id: &str,
        section: &str,
        findings: &[AnomalyDetectionResult],
    ) -> EngineResult<usize> {
        if findings.is_empty() {
            return Ok(0);
        }
        let records: Vec<Anomaly> = findings
            .iter()
            .map(|finding| Anomaly::record(investigation_id, finding))
            .collect();
        self.db.insert_anomalies(&records)?;
        audit::log_analysis_persisted(investigation_id, section, records.len());
        Ok(records.len())
    }

    fn run_detector<D, F>(&self, caller: &Caller, investigation_id: &str, build: F) -> EngineResult<DetectorReport>
    where
        D: Detector,
        F: FnOnce(&EngineConfig) -> D,
    {
        let investigation = self.authorize(caller, investigation_id)?;
        let config = self.config_for(&investigation.owner_id)?;
        let transactions = self.ledger.transactions_for_owner(&investigation.owner_id)?;

        let detector = build(&config);
        let budget = Budget::new(Duration::from_millis(config.detectors.budget_ms));
        let report = detector
            .detect(&transactions, &budget)
            .map_err(|e| EngineError::Detector {
                detector: detector.name().to_string(),
                reason: e.to_string(),
            })?;

        self.persist_findings(&investigation.id, detector.name(), &report.anomalies)?;
        Ok(report)
    }

    pub fn detect_duplicate_payments(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<Vec<AnomalyDetectionResult>> {
        Ok(self
            .run_detector(caller, investigation_id, |_| DuplicatePaymentDetector)?
            .anomalies)
    }

    pub fn detect_unusual_timing(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<Vec<AnomalyDetectionResult>> {
        Ok(self
            .run_detector(caller, investigation_id, |c| UnusualTimingDetector::new(&c.detectors))?
            .anomalies)
    }

    pub fn detect_round_dollar_anomalies(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<Vec<AnomalyDetectionResult>> {
        Ok(self
            .run_detector(caller, investigation_id, |c| RoundDollarDetector::new(&c.detectors))?
            .anomalies)
    }

    /// First-digit table for arbitrary amounts, using the engine's reference table
    pub fn analyze_benfords_law(&self, amounts: &[Decimal]) -> Vec<BenfordAnalysisResult> {
        analyze_benfords_law(amounts, &self.config.benford)
    }

    /// Benford analysis over the investigation's ledger; a violation is stored as an anomaly
    pub fn run_benfords_law_analysis(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<Vec<BenfordAnalysisResult>> {
        Ok(self
            .run_detector(caller, investigation_id, |c| BenfordDetector::new(c.benford.clone()))?
            .digits)
    }

    /// Score every transaction and run all detectors, reporting each section separately
    #[instrument(skip(self, caller))]
    pub fn run_comprehensive_analysis(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<ComprehensiveAnalysis> {
        let started_at = Utc::now();
        let investigation = self.authorize(caller, investigation_id)?;
        let config = self.config_for(&investigation.owner_id)?;
        let transactions = self.ledger.transactions_for_owner(&investigation.owner_id)?;
        info!(transactions = transactions.len(), "Comprehensive analysis started");

        let mut sections = Vec::new();
        sections.push(self.scoring_section(&investigation.id, &config, &transactions));

        for mut outcome in AnalysisRunner::new(&config).run(&transactions) {
            if outcome.is_completed() {
                match self.persist_findings(&investigation.id, &outcome.section, &outcome.anomalies) {
                    Ok(saved) => outcome.records_saved = Some(saved),
                    Err(e) => {
                        warn!(section = %outcome.section, error = %e, "Could not store anomalies");
                        outcome.fail(e);
                    }
                }
            }
            sections.push(outcome);
        }

        let analysis = ComprehensiveAnalysis {
            investigation_id: investigation.id,
            transaction_count: transactions.len(),
            sections,
            started_at,
            finished_at: Utc::now(),
        };

        if analysis.is_complete() {
            info!(anomalies = analysis.anomaly_count(), "Comprehensive analysis completed");
        } else {
            warn!(failed = ?analysis.failed_sections(), "Comprehensive analysis partially completed");
        }
        Ok(analysis)
    }

    fn scoring_section(&self, investigation_id: &str, config: &EngineConfig, transactions: &[Transaction]) -> SectionOutcome {
        let started = Instant::now();
        let result = RiskScorer::new(config.scoring.clone()).and_then(|scorer| {
            let records = Self::score_all(&scorer, investigation_id, transactions);
            self.db.insert_analyses(&records)?;
            audit::log_analysis_persisted(investigation_id, SCORING_SECTION, records.len());
            Ok(records.len())
        });

        match result {
            Ok(saved) => {
                let mut outcome = SectionOutcome::completed(SCORING_SECTION, started.elapsed());
                outcome.records_saved = Some(saved);
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Transaction scoring failed");
                SectionOutcome::failed(SCORING_SECTION, e, started.elapsed())
            }
        }
    }

    pub fn list_anomalies(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Vec<Anomaly>> {
        let investigation = self.authorize(caller, investigation_id)?;
        self.db.list_anomalies(&investigation.id)
    }

    // ========================================================================
    // Flow-of-Funds Tracer
    // ========================================================================

    pub fn trace_flow_of_funds(
        &self,
        caller: &Caller,
        investigation_id: &str,
        source_transaction_id: &str,
    ) -> EngineResult<FlowOfFundsTrace> {
        let investigation = self.authorize(caller, investigation_id)?;
        let source = self
            .ledger
            .transaction(&investigation.owner_id, source_transaction_id)?
            .ok_or_else(|| EngineError::not_found("Transaction", source_transaction_id))?;

        let trace = flow::trace_from_transaction(&investigation.id, &source);
        self.db.insert_flow_trace(&trace)?;
        audit::log_analysis_persisted(&investigation.id, "flow_of_funds", 1);
        Ok(trace)
    }

    /// Store an investigator-entered multi-hop trace
    pub fn record_flow_trace(&self, caller: &Caller, new: NewFlowTrace) -> EngineResult<FlowOfFundsTrace> {
        let investigation = self.authorize(caller, &new.investigation_id)?;
        if self
            .ledger
            .transaction(&investigation.owner_id, &new.source_transaction_id)?
            .is_none()
        {
            return Err(EngineError::not_found("Transaction", new.source_transaction_id));
        }

        let trace = new.into_trace()?;
        self.db.insert_flow_trace(&trace)?;
        audit::log_analysis_persisted(&investigation.id, "flow_of_funds", 1);
        Ok(trace)
    }

    pub fn list_flow_traces(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Vec<FlowOfFundsTrace>> {
        let investigation = self.authorize(caller, investigation_id)?;
        self.db.list_flow_traces(&investigation.id)
    }

    // ========================================================================
    // Damage Calculator
    // ========================================================================

    /// Direct loss over transactions the investigator has judged improper
    pub fn calculate_direct_loss(
        &self,
        caller: &Caller,
        investigation_id: &str,
        transaction_ids: &[String],
    ) -> EngineResult<DamageCalculation> {
        let investigation = self.authorize(caller, investigation_id)?;
        if transaction_ids.is_empty() {
            return Err(EngineError::validation("Direct loss needs at least one transaction id"));
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(transaction_ids.len());
        for id in transaction_ids {
            if !seen.insert(id.as_str()) {
                return Err(EngineError::validation(format!("Transaction {} is listed more than once", id)));
            }
            let transaction = self
                .ledger
                .transaction(&investigation.owner_id, id)?
                .ok_or_else(|| EngineError::not_found("Transaction", id.as_str()))?;
            selected.push(transaction);
        }

        let calc = damages::direct_loss(&selected)?.for_investigation(&investigation.id);
        self.store_damage_calculation(&calc)?;
        Ok(calc)
    }

    /// Unexplained-wealth calculation; pure, nothing is stored
    pub fn calculate_net_worth_method(&self, inputs: &NetWorthInputs) -> EngineResult<DamageCalculation> {
        damages::net_worth_method(inputs)
    }

    /// Net-worth calculation stored against an investigation
    pub fn record_net_worth_method(
        &self,
        caller: &Caller,
        investigation_id: &str,
        inputs: &NetWorthInputs,
    ) -> EngineResult<DamageCalculation> {
        let investigation = self.authorize(caller, investigation_id)?;
        let calc = damages::net_worth_method(inputs)?.for_investigation(&investigation.id);
        self.store_damage_calculation(&calc)?;
        Ok(calc)
    }

    fn store_damage_calculation(&self, calc: &DamageCalculation) -> EngineResult<()> {
        self.db.insert_damage_calculation(calc)?;
        audit::log_damage_calculation(
            calc.investigation_id.as_deref().unwrap_or_default(),
            calc.method.as_str(),
            &calc.total_damage.to_string(),
        );
        Ok(())
    }

    pub fn calculate_pre_judgment_interest(
        &self,
        amount: Decimal,
        loss_date: DateTime<Utc>,
        annual_rate: Decimal,
    ) -> EngineResult<Decimal> {
        damages::pre_judgment_interest(amount, loss_date, annual_rate)
    }

    pub fn calculate_pre_judgment_interest_as_of(
        &self,
        amount: Decimal,
        loss_date: DateTime<Utc>,
        annual_rate: Decimal,
        as_of: DateTime<Utc>,
    ) -> EngineResult<Decimal> {
        damages::pre_judgment_interest_as_of(amount, loss_date, annual_rate, as_of)
    }

    pub fn list_damage_calculations(
        &self,
        caller: &Caller,
        investigation_id: &str,
    ) -> EngineResult<Vec<DamageCalculation>> {
        let investigation = self.authorize(caller, investigation_id)?;
        self.db.list_damage_calculations(&investigation.id)
    }

    // ========================================================================
    // Report Synthesizer
    // ========================================================================

    pub fn investigation_summary(&self, caller: &Caller, investigation_id: &str) -> EngineResult<InvestigationSummary> {
        let investigation = self.authorize(caller, investigation_id)?;
        let id = investigation.id.clone();

        Ok(InvestigationSummary::builder(investigation)
            .analyses(self.db.list_analyses(&id)?)
            .anomalies(self.db.list_anomalies(&id)?)
            .damages(self.db.list_damage_calculations(&id)?)
            .evidence_count(self.db.list_evidence(&id)?.len())
            .flow_trace_count(self.db.list_flow_traces(&id)?.len())
            .build())
    }

    /// Markdown executive summary; reads only
    pub fn generate_executive_summary(&self, caller: &Caller, investigation_id: &str) -> EngineResult<String> {
        let summary = self.investigation_summary(caller, investigation_id)?;
        self.templates.render_executive_summary(&summary)
    }

    pub fn render_investigation_summary(
        &self,
        caller: &Caller,
        investigation_id: &str,
        format: OutputFormat,
    ) -> EngineResult<String> {
        let summary = self.investigation_summary(caller, investigation_id)?;
        render_summary(&self.templates, &summary, format)
    }

    /// Render the executive summary and store it as a new report version
    pub fn publish_executive_summary(&self, caller: &Caller, investigation_id: &str) -> EngineResult<ForensicReport> {
        let summary = self.investigation_summary(caller, investigation_id)?;
        let content = self.templates.render_executive_summary(&summary)?;
        let new = NewForensicReport::new(
            &summary.investigation.id,
            ReportType::ExecutiveSummary,
            format!("Executive Summary - {}", summary.investigation.case_number),
            content,
            &caller.user_id,
        );
        self.create_forensic_report(caller, new)
    }

    pub fn create_forensic_report(&self, caller: &Caller, new: NewForensicReport) -> EngineResult<ForensicReport> {
        let investigation = self.authorize(caller, &new.investigation_id)?;
        let report = new.into_report()?;
        self.db.insert_report(&report)?;
        audit::log_report_created(&investigation.id, &report.id, report.report_type.as_str(), &report.generated_by);
        Ok(report)
    }

    pub fn list_reports(&self, caller: &Caller, investigation_id: &str) -> EngineResult<Vec<ForensicReport>> {
        let investigation = self.authorize(caller, investigation_id)?;
        self.db.list_reports(&investigation.id)
    }

    pub fn export_report_json(&self, caller: &Caller, report_id: &str) -> EngineResult<String> {
        let report = self
            .db
            .get_report(report_id)?
            .ok_or_else(|| EngineError::not_found("Report", report_id))?;
        self.authorize(caller, &report.investigation_id)?;
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{AnomalyType, SectionStatus};
    use crate::evidence::{compute_hash, EvidenceType, HashAlgorithm};
    use crate::flow::{FlowHop, FlowMethod, Traceability};
    use crate::scoring::{LegitimacyAssessment, RiskLevel};
    use crate::transaction::{parse_date, InMemoryLedger, TransactionKind};
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn at(text: &str) -> DateTime<Utc> {
        parse_date(text).unwrap()
    }

    fn ledger() -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        ledger.extend(
            "alice",
            vec![
                Transaction::new("t1", dec!(-1500), TransactionKind::Expense)
                    .with_description("Vendor invoice 88")
                    .with_date(at("2024-03-05T10:00:00Z")),
                Transaction::new("t2", dec!(-1500), TransactionKind::Expense)
                    .with_description("Vendor invoice 88")
                    .with_date(at("2024-03-05T15:00:00Z")),
                Transaction::new("t3", dec!(-75000), TransactionKind::Expense)
                    .with_description("cash")
                    .with_counterparty("J. Smith")
                    .with_date(at("2024-03-02T23:30:00Z")),
                Transaction::new("t4", dec!(123.45), TransactionKind::Income)
                    .with_description("Quarterly software licence")
                    .with_date(at("2024-03-06T09:00:00Z")),
            ],
        );
        ledger.insert(
            "bob",
            Transaction::new("b1", dec!(10), TransactionKind::Income).with_description("Bob's own record"),
        );
        ledger
    }

    fn engine() -> ForensicEngine<InMemoryLedger> {
        ForensicEngine::new(Database::open_in_memory().unwrap(), ledger(), EngineConfig::default()).unwrap()
    }

    fn alice() -> Caller {
        Caller::new("alice")
    }

    fn bob() -> Caller {
        Caller::new("bob")
    }

    fn open_case(engine: &ForensicEngine<InMemoryLedger>) -> Investigation {
        let mut new = NewInvestigation::titled("Accounts payable fraud");
        new.allegations = Some("Duplicate vendor payments".to_string());
        engine.create_investigation(&alice(), new).unwrap()
    }

    #[test]
    fn test_create_get_and_list() {
        let engine = engine();
        let inv = open_case(&engine);

        assert_eq!(inv.owner_id, "alice");
        assert_eq!(inv.status, InvestigationStatus::Open);
        assert_eq!(engine.get_investigation(&alice(), &inv.id).unwrap().unwrap().id, inv.id);
        assert!(engine.get_investigation(&alice(), "missing").unwrap().is_none());
        assert_eq!(engine.list_investigations(&alice(), "alice").unwrap().len(), 1);
        assert!(engine.list_investigations(&bob(), "alice").unwrap().is_empty());
    }

    #[test]
    fn test_access_denied_before_any_read_or_write() {
        let engine = engine();
        let inv = open_case(&engine);

        assert!(matches!(
            engine.get_investigation(&bob(), &inv.id),
            Err(EngineError::AccessDenied { .. })
        ));
        assert!(matches!(
            engine.analyze_all_transactions(&bob(), &inv.id),
            Err(EngineError::AccessDenied { .. })
        ));
        assert!(matches!(
            engine.add_evidence(&bob(), NewEvidence::new(&inv.id, "E-1", EvidenceType::Email, "Inbox export")),
            Err(EngineError::AccessDenied { .. })
        ));
        assert!(engine.list_analyses(&alice(), &inv.id).unwrap().is_empty());
        assert!(engine.get_evidence(&alice(), &inv.id).unwrap().is_empty());
    }

    #[test]
    fn test_custom_policy() {
        let engine = engine().with_policy(|inv: &Investigation, caller: &Caller| {
            inv.owner_id == caller.user_id || caller.user_id == "auditor"
        });
        let inv = open_case(&engine);
        assert!(engine.get_investigation(&Caller::new("auditor"), &inv.id).is_ok());
        assert!(engine.get_investigation(&bob(), &inv.id).is_err());
    }

    #[test]
    fn test_lifecycle_forward_only_with_reopen() {
        let engine = engine();
        let inv = open_case(&engine);

        let inv2 = engine
            .update_investigation_status(&alice(), &inv.id, InvestigationStatus::Completed)
            .unwrap();
        assert_eq!(inv2.status, InvestigationStatus::Completed);

        let back = engine.update_investigation_status(&alice(), &inv.id, InvestigationStatus::Open);
        assert!(matches!(back, Err(EngineError::InvalidTransition { .. })));

        let reopened = engine.reopen_investigation(&alice(), &inv.id).unwrap();
        assert_eq!(reopened.status, InvestigationStatus::InProgress);
        assert!(engine.reopen_investigation(&alice(), &inv.id).is_err());

        let stored = engine.get_investigation(&alice(), &inv.id).unwrap().unwrap();
        assert_eq!(stored.status, InvestigationStatus::InProgress);
    }

    #[test]
    fn test_status_update_unknown_investigation() {
        let engine = engine();
        let result = engine.update_investigation_status(&alice(), "nope", InvestigationStatus::Closed);
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn test_evidence_custody_is_append_only_and_ordered() {
        let engine = engine();
        let inv = open_case(&engine);

        let ev = engine
            .add_evidence(&alice(), NewEvidence::new(&inv.id, "E-001", EvidenceType::BankStatement, "March statement"))
            .unwrap();
        assert!(ev.custody_log.is_empty());

        let duplicate = NewEvidence::new(&inv.id, "E-001", EvidenceType::Invoice, "Another item");
        assert!(matches!(engine.add_evidence(&alice(), duplicate), Err(EngineError::Validation(_))));

        let holders = ["forensic lab", "evidence vault", "outside counsel"];
        for (i, holder) in holders.iter().enumerate() {
            let updated = engine
                .append_custody_entry(&alice(), &ev.id, NewCustodyEntry::new(*holder, "intake", "transfer"))
                .unwrap();
            assert_eq!(updated.custody_log.len(), i + 1);
        }

        let stored = &engine.get_evidence(&alice(), &inv.id).unwrap()[0];
        let order: Vec<_> = stored.custody_log.iter().map(|e| e.transferred_to.as_str()).collect();
        assert_eq!(order, holders);
        assert_eq!(stored.custody_log.current_custodian(), Some("outside counsel"));

        assert!(matches!(
            engine.append_custody_entry(&bob(), &ev.id, NewCustodyEntry::new("bob", "bob", "steal")),
            Err(EngineError::AccessDenied { .. })
        ));
        assert!(matches!(
            engine.append_custody_entry(&alice(), "missing", NewCustodyEntry::new("a", "b", "c")),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_evidence_integrity_verification() {
        let engine = engine();
        let inv = open_case(&engine);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"general ledger export").unwrap();
        file.flush().unwrap();

        let mut new = NewEvidence::new(&inv.id, "E-002", EvidenceType::LedgerExport, "GL export");
        new.file_path = Some(file.path().to_path_buf());
        new.hash_algorithm = Some(HashAlgorithm::Blake3);
        let ev = engine.add_evidence(&alice(), new).unwrap();
        assert_eq!(
            ev.content_hash.as_ref().unwrap().value,
            compute_hash(b"general ledger export", HashAlgorithm::Blake3)
        );

        assert!(engine.verify_evidence_integrity(&alice(), &ev.id, file.path()).unwrap().matches);
        file.write_all(b" edited").unwrap();
        file.flush().unwrap();
        assert!(!engine.verify_evidence_integrity(&alice(), &ev.id, file.path()).unwrap().matches);
    }

    #[test]
    fn test_analyze_transaction_is_deterministic() {
        let engine = engine();
        let inv = open_case(&engine);
        let tx = Transaction::new("x", dec!(60000), TransactionKind::Expense)
            .with_description("misc")
            .with_date(at("2024-03-09T12:00:00Z"));

        let first = engine.analyze_transaction(&alice(), &inv.id, &tx).unwrap();
        let second = engine.analyze_transaction(&alice(), &inv.id, &tx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.risk_level, RiskLevel::High);
        assert_eq!(first.legitimacy_assessment, LegitimacyAssessment::Improper);
        assert_eq!(engine.list_analyses(&alice(), &inv.id).unwrap().len(), 2);
    }

    #[test]
    fn test_analyze_all_uses_owner_ledger_only() {
        let engine = engine();
        let inv = open_case(&engine);
        let results = engine.analyze_all_transactions(&alice(), &inv.id).unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.transaction_id.starts_with('t')));
        let t3 = results.iter().find(|r| r.transaction_id == "t3").unwrap();
        assert_eq!(t3.score, 85);
        assert_eq!(t3.legitimacy_assessment, LegitimacyAssessment::Improper);
        assert_eq!(engine.list_analyses(&alice(), &inv.id).unwrap().len(), 4);
    }

    #[test]
    fn test_individual_detectors_persist_findings() {
        let engine = engine();
        let inv = open_case(&engine);

        let duplicates = engine.detect_duplicate_payments(&alice(), &inv.id).unwrap();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].affected_transactions, vec!["t1", "t2"]);

        let timing = engine.detect_unusual_timing(&alice(), &inv.id).unwrap();
        assert_eq!(timing.len(), 2);

        let round = engine.detect_round_dollar_anomalies(&alice(), &inv.id).unwrap();
        assert_eq!(round.len(), 1);

        let digits = engine.run_benfords_law_analysis(&alice(), &inv.id).unwrap();
        assert_eq!(digits.len(), 9);

        let stored = engine.list_anomalies(&alice(), &inv.id).unwrap();
        assert_eq!(stored.len(), 5);
        assert!(stored.iter().any(|a| a.anomaly_type == AnomalyType::BenfordViolation));
        assert!(stored.iter().all(|a| a.investigation_id == inv.id));
    }

    #[test]
    fn test_pure_benford_uses_engine_table() {
        let engine = engine();
        assert!(engine.analyze_benfords_law(&[]).is_empty());
        assert_eq!(engine.analyze_benfords_law(&[dec!(1), dec!(2)]).len(), 9);
    }

    #[test]
    fn test_comprehensive_analysis_reports_every_section() {
        let engine = engine();
        let inv = open_case(&engine);
        let analysis = engine.run_comprehensive_analysis(&alice(), &inv.id).unwrap();

        assert!(analysis.is_complete());
        assert_eq!(analysis.transaction_count, 4);
        let names: Vec<_> = analysis.sections.iter().map(|s| s.section.as_str()).collect();
        assert_eq!(
            names,
            vec![SCORING_SECTION, "duplicate_payments", "unusual_timing", "round_dollar", "benford"]
        );
        assert_eq!(analysis.section(SCORING_SECTION).unwrap().records_saved, Some(4));
        assert_eq!(analysis.anomaly_count(), 5);
        assert_eq!(engine.list_anomalies(&alice(), &inv.id).unwrap().len(), 5);
    }

    #[test]
    fn test_comprehensive_analysis_surfaces_partial_failure() {
        let engine = engine();
        let inv = open_case(&engine);

        let mut config = EngineConfig::default();
        config.detectors.budget_ms = 0;
        engine.set_tenant_config(&alice(), &config).unwrap();

        let analysis = engine.run_comprehensive_analysis(&alice(), &inv.id).unwrap();
        assert!(!analysis.is_complete());
        assert_eq!(analysis.sections[0].status, SectionStatus::Completed);
        assert_eq!(
            analysis.failed_sections(),
            vec!["duplicate_payments", "unusual_timing", "round_dollar", "benford"]
        );
        assert!(analysis.sections[1].error.as_deref().unwrap().contains("budget"));

        assert!(matches!(
            engine.detect_duplicate_payments(&alice(), &inv.id),
            Err(EngineError::Detector { .. })
        ));
    }

    #[test]
    fn test_flow_of_funds() {
        let engine = engine();
        let inv = open_case(&engine);

        let trace = engine.trace_flow_of_funds(&alice(), &inv.id, "t3").unwrap();
        assert_eq!(trace.path.len(), 1);
        assert_eq!(trace.path[0].method, FlowMethod::Payment);
        assert_eq!(trace.ultimate_beneficiaries, vec!["J. Smith"]);
        assert_eq!(trace.traceability, Traceability::PartiallyTraced);

        assert!(matches!(
            engine.trace_flow_of_funds(&alice(), &inv.id, "b1"),
            Err(EngineError::NotFound { .. })
        ));

        let manual = NewFlowTrace {
            investigation_id: inv.id.clone(),
            source_transaction_id: "t3".to_string(),
            path: vec![
                FlowHop {
                    step: 1,
                    account: "Operating".to_string(),
                    entity: "J. Smith".to_string(),
                    amount: dec!(75000),
                    date: None,
                    method: FlowMethod::Cash,
                },
                FlowHop {
                    step: 2,
                    account: "Personal savings".to_string(),
                    entity: "Smith household".to_string(),
                    amount: dec!(70000),
                    date: None,
                    method: FlowMethod::Deposit,
                },
            ],
            total_traced: None,
            ultimate_beneficiaries: Vec::new(),
            traceability: Traceability::FullyTraced,
            notes: None,
        };
        let recorded = engine.record_flow_trace(&alice(), manual).unwrap();
        assert_eq!(recorded.total_traced, dec!(70000));
        assert_eq!(engine.list_flow_traces(&alice(), &inv.id).unwrap().len(), 2);
    }

    #[test]
    fn test_direct_loss() {
        let engine = engine();
        let inv = open_case(&engine);

        let ids = vec!["t3".to_string(), "t1".to_string()];
        let calc = engine.calculate_direct_loss(&alice(), &inv.id, &ids).unwrap();
        assert_eq!(calc.total_damage, dec!(76500));
        assert_eq!(calc.breakdown_total(), calc.total_damage);
        assert_eq!(engine.list_damage_calculations(&alice(), &inv.id).unwrap().len(), 1);

        assert!(matches!(
            engine.calculate_direct_loss(&alice(), &inv.id, &[]),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.calculate_direct_loss(&alice(), &inv.id, &["t1".to_string(), "nope".to_string()]),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            engine.calculate_direct_loss(&alice(), &inv.id, &["t1".to_string(), "t1".to_string()]),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_pure_calculators() {
        let engine = engine();
        let calc = engine
            .calculate_net_worth_method(&NetWorthInputs {
                beginning_net_worth: dec!(100000),
                ending_net_worth: dec!(250000),
                personal_expenditures: dec!(40000),
                legitimate_income: dec!(120000),
            })
            .unwrap();
        assert_eq!(calc.total_damage, dec!(70000));
        assert!(calc.investigation_id.is_none());

        let interest = engine
            .calculate_pre_judgment_interest(dec!(10000), Utc::now() - chrono::Duration::days(365), dec!(0.05))
            .unwrap();
        assert!((interest - dec!(500)).abs() <= dec!(1));
    }

    #[test]
    fn test_repeated_analysis_does_not_inflate_summary() {
        let engine = engine();
        let inv = open_case(&engine);
        engine.run_comprehensive_analysis(&alice(), &inv.id).unwrap();
        let once = engine.investigation_summary(&alice(), &inv.id).unwrap();

        engine.run_comprehensive_analysis(&alice(), &inv.id).unwrap();
        engine.analyze_all_transactions(&alice(), &inv.id).unwrap();
        assert_eq!(engine.list_analyses(&alice(), &inv.id).unwrap().len(), 12);

        let summary = engine.investigation_summary(&alice(), &inv.id).unwrap();
        assert_eq!(summary.transactions_analyzed, 4);
        assert_eq!(summary.by_assessment, once.by_assessment);
        assert_eq!(summary.by_risk, once.by_risk);
        assert_eq!(summary.by_assessment.improper, 1);
        assert_eq!(summary.improper_total, dec!(75000));
    }

    #[test]
    fn test_summary_and_reports() {
        let engine = engine();
        let inv = open_case(&engine);
        engine.run_comprehensive_analysis(&alice(), &inv.id).unwrap();
        engine
            .calculate_direct_loss(&alice(), &inv.id, &["t3".to_string()])
            .unwrap();

        let summary = engine.investigation_summary(&alice(), &inv.id).unwrap();
        assert_eq!(summary.transactions_analyzed, 4);
        assert_eq!(summary.by_assessment.improper, 1);
        assert_eq!(summary.improper_total, dec!(75000));
        assert_eq!(summary.anomalies_by_severity.total(), 5);
        assert_eq!(summary.damages.len(), 1);

        let text = engine.generate_executive_summary(&alice(), &inv.id).unwrap();
        assert!(text.contains("$75,000.00"));
        assert!(engine.list_reports(&alice(), &inv.id).unwrap().is_empty());

        let report = engine.publish_executive_summary(&alice(), &inv.id).unwrap();
        assert_eq!(report.report_type, ReportType::ExecutiveSummary);
        assert_eq!(engine.list_reports(&alice(), &inv.id).unwrap().len(), 1);

        let json = engine
            .render_investigation_summary(&alice(), &inv.id, OutputFormat::Json)
            .unwrap();
        assert!(json.contains("\"transactions_analyzed\": 4"));

        let json = engine.export_report_json(&alice(), &report.id).unwrap();
        assert!(json.contains("executive_summary"));
        assert!(matches!(
            engine.export_report_json(&bob(), &report.id),
            Err(EngineError::AccessDenied { .. })
        ));
        assert!(matches!(
            engine.generate_executive_summary(&alice(), "missing"),
            Err(EngineError::NotFound { .. })
        ));
    }
}
