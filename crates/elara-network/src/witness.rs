//! Witness attestation store — third-party counter-signatures keyed by
//! (record id, witness identity), append-only and idempotent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use elara_core::types::{IdentityHash, RecordId, Timestamp};
use elara_core::ElaraError;

/// One peer's counter-signature over a record's signable bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WitnessAttestation {
    pub record_id: RecordId,
    pub witness_identity_hash: IdentityHash,
    pub witness_signature: Vec<u8>,
    pub timestamp: Timestamp,
}

fn storage_err(e: impl std::fmt::Display) -> ElaraError {
    ElaraError::Storage(e.to_string())
}

/// Sled-backed attestation table. Key = record id bytes ++ witness hash
/// bytes, so per-record queries are a prefix scan.
pub struct WitnessManager {
    _db: sled::Db,
    attestations: sled::Tree,
}

impl WitnessManager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElaraError> {
        let db = sled::open(path).map_err(storage_err)?;
        let attestations = db.open_tree("attestations").map_err(storage_err)?;
        Ok(Self {
            _db: db,
            attestations,
        })
    }

    /// Store an attestation. Returns false when the (record, witness) pair
    /// was already present; the original row is kept.
    pub fn add_attestation(&self, attestation: &WitnessAttestation) -> Result<bool, ElaraError> {
        let mut key = attestation.record_id.as_bytes().to_vec();
        key.extend_from_slice(attestation.witness_identity_hash.as_bytes());

        if self.attestations.contains_key(&key).map_err(storage_err)? {
            return Ok(false);
        }
        let bytes = bincode::serialize(attestation)
            .map_err(|e| ElaraError::Serialization(e.to_string()))?;
        self.attestations.insert(key, bytes).map_err(storage_err)?;
        Ok(true)
    }

    pub fn get_attestations(
        &self,
        record_id: &RecordId,
    ) -> Result<Vec<WitnessAttestation>, ElaraError> {
        let mut out = Vec::new();
        for item in self.attestations.scan_prefix(record_id.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(
                bincode::deserialize(&bytes)
                    .map_err(|e| ElaraError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn witness_count(&self, record_id: &RecordId) -> Result<u64, ElaraError> {
        let mut count = 0;
        for item in self.attestations.scan_prefix(record_id.as_bytes()) {
            item.map_err(storage_err)?;
            count += 1;
        }
        Ok(count)
    }
}
