//! Evidence ledger
//!
//! Evidence items belong to exactly one investigation and carry an
//! append-only chain-of-custody log. File-backed items record a content hash
//! at registration so integrity can be re-verified later.

pub mod hash;
pub mod types;

pub use hash::{compute_hash, hash_file, hashes_match, HashAlgorithm};
pub use types::*;

use std::path::Path;

use chrono::Utc;

use crate::error::{EngineError, EngineResult};

/// Work out the digest to record for a new evidence item.
///
/// A file path wins over a precomputed digest; a precomputed digest must be
/// well formed for its algorithm.
pub fn resolve_content_hash(new: &NewEvidence) -> EngineResult<Option<ContentHash>> {
    if let Some(path) = &new.file_path {
        let algorithm = new.hash_algorithm.unwrap_or_default();
        let value = hash_file(path, algorithm)?;
        return Ok(Some(ContentHash { algorithm, value }));
    }

    match &new.content_hash {
        Some(supplied) => {
            if !hash::is_valid_hash(&supplied.value, supplied.algorithm) {
                return Err(EngineError::validation(format!(
                    "Content hash is not a valid {} digest",
                    supplied.algorithm.name()
                )));
            }
            Ok(Some(ContentHash {
                algorithm: supplied.algorithm,
                value: supplied.value.to_lowercase(),
            }))
        }
        None => Ok(None),
    }
}

/// Re-hash `path` with the algorithm recorded on `evidence` and compare
pub fn verify_integrity(evidence: &Evidence, path: &Path) -> EngineResult<IntegrityCheck> {
    let recorded = evidence.content_hash.as_ref().ok_or_else(|| {
        EngineError::validation(format!(
            "Evidence {} has no recorded content hash",
            evidence.evidence_number
        ))
    })?;

    let actual = hash_file(path, recorded.algorithm)?;
    Ok(IntegrityCheck {
        evidence_id: evidence.id.clone(),
        algorithm: recorded.algorithm,
        matches: hashes_match(&recorded.value, &actual),
        expected: recorded.value.clone(),
        actual,
        checked_at: Utc::now(),
    })
}
