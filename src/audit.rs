//! Forensic audit logging
//!
//! Structured events on the `forensic_audit` target for every state change an
//! investigation goes through, plus security events for denied access. Route
//! the target to durable storage with a `tracing` subscriber.

use std::path::Path;

use tracing::{info, span, warn, Level};

pub fn log_investigation_created(investigation_id: &str, case_number: &str, owner_id: &str) {
    info!(
        target: "forensic_audit",
        operation = "investigation_created",
        investigation_id = investigation_id,
        case_number = case_number,
        owner_id = owner_id,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Investigation opened"
    );
}

pub fn log_status_changed(investigation_id: &str, from: &str, to: &str, caller_id: &str) {
    info!(
        target: "forensic_audit",
        operation = "status_changed",
        investigation_id = investigation_id,
        from = from,
        to = to,
        caller_id = caller_id,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Investigation status changed"
    );
}

pub fn log_evidence_added(
    investigation_id: &str,
    evidence_id: &str,
    evidence_number: &str,
    content_hash: Option<&str>,
) {
    info!(
        target: "forensic_audit",
        operation = "evidence_added",
        investigation_id = investigation_id,
        evidence_id = evidence_id,
        evidence_number = evidence_number,
        content_hash = content_hash.unwrap_or("none"),
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Evidence registered"
    );
}

pub fn log_custody_appended(evidence_id: &str, transferred_to: &str, transferred_by: &str, purpose: &str) {
    info!(
        target: "forensic_audit",
        operation = "custody_appended",
        evidence_id = evidence_id,
        transferred_to = transferred_to,
        transferred_by = transferred_by,
        purpose = purpose,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Chain of custody entry appended"
    );
}

/// Log evidence file hash verification
pub fn log_hash_verification(
    evidence_id: &str,
    path: &Path,
    algorithm: &str,
    computed_hash: &str,
    expected_hash: &str,
    verified: bool,
) {
    let _span = span!(Level::INFO, "evidence_verification", evidence_id = evidence_id).entered();

    let status = if verified { "VERIFIED" } else { "MISMATCH" };
    if verified {
        info!(
            target: "forensic_audit",
            operation = "hash_verification",
            path = %path.display(),
            algorithm = algorithm,
            computed_hash = computed_hash,
            expected_hash = expected_hash,
            status = status,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "Hash verification completed"
        );
    } else {
        warn!(
            target: "forensic_audit",
            operation = "hash_verification",
            path = %path.display(),
            algorithm = algorithm,
            computed_hash = computed_hash,
            expected_hash = expected_hash,
            status = status,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "Evidence content no longer matches its recorded hash"
        );
    }
}

/// Log a batch of analysis rows written for an investigation
pub fn log_analysis_persisted(investigation_id: &str, section: &str, records: usize) {
    info!(
        target: "forensic_audit",
        operation = "analysis_persisted",
        investigation_id = investigation_id,
        section = section,
        records = records,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Analysis results stored"
    );
}

pub fn log_damage_calculation(investigation_id: &str, method: &str, total: &str) {
    info!(
        target: "forensic_audit",
        operation = "damage_calculation",
        investigation_id = investigation_id,
        method = method,
        total_damage = total,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Damage calculation stored"
    );
}

pub fn log_report_created(investigation_id: &str, report_id: &str, report_type: &str, generated_by: &str) {
    info!(
        target: "forensic_audit",
        operation = "report_created",
        investigation_id = investigation_id,
        report_id = report_id,
        report_type = report_type,
        generated_by = generated_by,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Forensic report created"
    );
}

/// Log security event (denied access, rejected operation)
pub fn log_security_event(event_type: &str, description: &str, investigation_id: &str, caller_id: &str) {
    warn!(
        target: "forensic_audit",
        event_type = "security",
        security_event = event_type,
        description = description,
        investigation_id = investigation_id,
        caller_id = caller_id,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Security event"
    );
}
