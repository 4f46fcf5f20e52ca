//! Hash-chain tamper evidence.
//!
//! Every record stores the hash of the record appended immediately before it
//! (`prev_hash`) and a SHA-256 digest over its own canonical JSON
//! (`record_hash`). The chain has one scope: the backend log file, shared by
//! all schemas written to it. Any modification, insertion, or deletion inside
//! a verified range surfaces as a [`ChainBreak`].
//!
//! A broken chain is a reportable finding, not a programming error:
//! verification returns an [`IntegrityResult`], it never fails because of
//! tampering.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AuditError;
use crate::record::AuditRecord;

/// `prev_hash` of the first record in a log.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Canonical JSON of a record for hashing: sorted keys, with the
/// `record_hash` and `signature` fields excluded. `prev_hash` stays in, which
/// is what links the chain.
pub fn canonical_json(record: &AuditRecord) -> Result<String, AuditError> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove("record_hash");
        map.remove("signature");
    }
    Ok(value.to_string())
}

/// Compute the hash a record should carry, from its stored fields
/// (including its stored `prev_hash`).
pub fn compute_record_hash(record: &AuditRecord) -> Result<String, AuditError> {
    let canonical = canonical_json(record)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest))
}

/// Externally supplied signing capability for forensic evidence levels.
///
/// The audit engine does not own keys; it signs `record_hash` values through
/// whatever provider the runtime injects.
pub trait SignatureProvider: Send + Sync {
    fn sign(&self, record_hash: &str) -> Result<String, AuditError>;

    fn verify(&self, record_hash: &str, signature: &str) -> Result<bool, AuditError>;
}

/// What kind of disagreement a chain break represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The recomputed hash disagrees with the stored `record_hash`.
    HashMismatch,
    /// The stored `prev_hash` does not match the preceding record's stored
    /// hash.
    LinkMismatch,
    /// A stored signature failed verification.
    SignatureInvalid,
    /// The stored line could not be decoded at all.
    Unreadable,
}

/// One detected break in the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBreak {
    /// Zero-based position within the verified range.
    pub position: u64,

    /// Record id at the break (empty for unreadable lines).
    pub record_id: String,

    pub kind: BreakKind,

    pub expected: String,

    pub actual: String,
}

/// Outcome of a chain verification walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub valid: bool,

    pub records_checked: u64,

    pub chain_breaks: Vec<ChainBreak>,
}

impl IntegrityResult {
    pub fn empty() -> Self {
        Self {
            valid: true,
            records_checked: 0,
            chain_breaks: Vec::new(),
        }
    }
}

/// Incremental chain verifier.
///
/// Feed records in append order; the verifier recomputes each record's hash
/// from its stored fields and checks the link to the previous record's
/// stored hash. Memory use is constant regardless of range size.
pub struct ChainVerifier<'a> {
    /// Stored hash of the previously verified record. `None` until the
    /// first record is seen; the first record's link is checked against
    /// `expected_prev` instead.
    prev_stored_hash: Option<String>,

    /// What the first record's `prev_hash` should be, when known. `None`
    /// accepts the stored value as the trusted seed (verification starting
    /// mid-chain, e.g. after a retention sweep removed the head).
    expected_prev: Option<String>,

    signer: Option<&'a dyn SignatureProvider>,

    checked: u64,

    breaks: Vec<ChainBreak>,
}

impl<'a> ChainVerifier<'a> {
    pub fn new(expected_prev: Option<String>, signer: Option<&'a dyn SignatureProvider>) -> Self {
        Self {
            prev_stored_hash: None,
            expected_prev,
            signer,
            checked: 0,
            breaks: Vec::new(),
        }
    }

    /// Verify one record and advance the chain state.
    pub fn push(&mut self, record: &AuditRecord) -> Result<(), AuditError> {
        let position = self.checked;

        let expected_link = match (&self.prev_stored_hash, &self.expected_prev) {
            (Some(prev), _) => Some(prev.clone()),
            (None, Some(seed)) => Some(seed.clone()),
            (None, None) => None,
        };
        if let Some(expected) = expected_link {
            if record.prev_hash != expected {
                self.breaks.push(ChainBreak {
                    position,
                    record_id: record.record_id.clone(),
                    kind: BreakKind::LinkMismatch,
                    expected,
                    actual: record.prev_hash.clone(),
                });
            }
        }

        let recomputed = compute_record_hash(record)?;
        if recomputed != record.record_hash {
            self.breaks.push(ChainBreak {
                position,
                record_id: record.record_id.clone(),
                kind: BreakKind::HashMismatch,
                expected: recomputed,
                actual: record.record_hash.clone(),
            });
        }

        if let (Some(signer), Some(signature)) = (self.signer, record.signature.as_deref()) {
            match signer.verify(&record.record_hash, signature) {
                Ok(true) => {}
                Ok(false) => self.breaks.push(ChainBreak {
                    position,
                    record_id: record.record_id.clone(),
                    kind: BreakKind::SignatureInvalid,
                    expected: String::new(),
                    actual: signature.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }

        self.prev_stored_hash = Some(record.record_hash.clone());
        self.checked += 1;
        Ok(())
    }

    /// Record an undecodable line inside the range.
    pub fn push_unreadable(&mut self, raw: &str) {
        self.breaks.push(ChainBreak {
            position: self.checked,
            record_id: String::new(),
            kind: BreakKind::Unreadable,
            expected: String::new(),
            actual: raw.chars().take(80).collect(),
        });
        self.checked += 1;
        // The chain cannot be re-linked across an unreadable line; the next
        // record will also surface a link mismatch, which is correct.
        self.prev_stored_hash = None;
    }

    pub fn finish(self) -> IntegrityResult {
        IntegrityResult {
            valid: self.breaks.is_empty(),
            records_checked: self.checked,
            chain_breaks: self.breaks,
        }
    }
}

/// Verify a slice of records held in memory.
///
/// `expected_prev` is what the first record's `prev_hash` should match
/// ([`GENESIS_HASH`] for a log verified from its beginning); `None` trusts
/// the stored value.
pub fn verify_chain(
    records: &[AuditRecord],
    expected_prev: Option<&str>,
    signer: Option<&dyn SignatureProvider>,
) -> Result<IntegrityResult, AuditError> {
    let mut verifier = ChainVerifier::new(expected_prev.map(str::to_string), signer);
    for record in records {
        verifier.push(record)?;
    }
    Ok(verifier.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledge_core::{CallerType, OperationType};
    use serde_json::json;
    use uuid::Uuid;

    fn chained(n: usize) -> Vec<AuditRecord> {
        let mut prev = GENESIS_HASH.to_string();
        (0..n)
            .map(|i| {
                let mut record =
                    AuditRecord::builder(OperationType::Tool, format!("op_{i}"), CallerType::Cli)
                        .schema("tool_call", 1)
                        .input_data(json!({"i": i}))
                        .build();
                record.record_id = Uuid::new_v4().to_string();
                record.prev_hash = prev.clone();
                record.record_hash = compute_record_hash(&record).unwrap();
                prev = record.record_hash.clone();
                record
            })
            .collect()
    }

    #[test]
    fn canonical_json_excludes_hash_and_signature() {
        let mut record = AuditRecord::builder(OperationType::Tool, "t", CallerType::Cli)
            .schema("s", 1)
            .build();
        record.record_hash = "deadbeef".to_string();
        record.signature = Some("sig".to_string());

        let canonical = canonical_json(&record).unwrap();
        assert!(!canonical.contains("deadbeef"));
        assert!(!canonical.contains("\"signature\""));
        assert!(canonical.contains("\"prev_hash\""));
    }

    #[test]
    fn hash_changes_when_any_field_changes() {
        let records = chained(1);
        let mut tampered = records[0].clone();
        tampered.operation_name = "something_else".to_string();
        assert_ne!(
            compute_record_hash(&records[0]).unwrap(),
            compute_record_hash(&tampered).unwrap()
        );
    }

    #[test]
    fn intact_chain_verifies() {
        let records = chained(5);
        let result = verify_chain(&records, Some(GENESIS_HASH), None).unwrap();
        assert!(result.valid);
        assert_eq!(result.records_checked, 5);
        assert!(result.chain_breaks.is_empty());
    }

    #[test]
    fn empty_chain_is_valid() {
        let result = verify_chain(&[], Some(GENESIS_HASH), None).unwrap();
        assert!(result.valid);
        assert_eq!(result.records_checked, 0);
    }

    #[test]
    fn tampered_field_breaks_chain() {
        let mut records = chained(5);
        records[2].input_data = json!({"i": "tampered"});

        let result = verify_chain(&records, Some(GENESIS_HASH), None).unwrap();
        assert!(!result.valid);
        assert!(result
            .chain_breaks
            .iter()
            .any(|b| b.position == 2 && b.kind == BreakKind::HashMismatch));
    }

    #[test]
    fn deleted_record_breaks_link() {
        let mut records = chained(5);
        records.remove(2);

        let result = verify_chain(&records, Some(GENESIS_HASH), None).unwrap();
        assert!(!result.valid);
        assert!(result
            .chain_breaks
            .iter()
            .any(|b| b.kind == BreakKind::LinkMismatch));
    }

    #[test]
    fn mid_chain_verification_trusts_stored_seed() {
        let records = chained(5);
        let tail = &records[2..];
        let result = verify_chain(tail, None, None).unwrap();
        assert!(result.valid);
        assert_eq!(result.records_checked, 3);
    }

    struct ParitySigner;

    impl SignatureProvider for ParitySigner {
        fn sign(&self, record_hash: &str) -> Result<String, AuditError> {
            Ok(format!("sig:{record_hash}"))
        }

        fn verify(&self, record_hash: &str, signature: &str) -> Result<bool, AuditError> {
            Ok(signature == format!("sig:{record_hash}"))
        }
    }

    #[test]
    fn bad_signature_is_a_break() {
        let mut records = chained(2);
        let signer = ParitySigner;
        records[0].signature = Some(signer.sign(&records[0].record_hash).unwrap());
        records[1].signature = Some("sig:bogus".to_string());

        let result = verify_chain(&records, Some(GENESIS_HASH), Some(&signer)).unwrap();
        assert!(!result.valid);
        assert_eq!(result.chain_breaks.len(), 1);
        assert_eq!(result.chain_breaks[0].kind, BreakKind::SignatureInvalid);
        assert_eq!(result.chain_breaks[0].position, 1);
    }
}
