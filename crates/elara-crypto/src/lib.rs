//! elara-crypto — SHA3 hashing, post-quantum signatures, and the dual-key
//! node identity.

pub mod dilithium;
pub mod hash;
pub mod identity;
pub mod sphincs;

pub use hash::{content_hash_from_wire, sha3_256};
pub use identity::Identity;

use elara_core::{ElaraError, ValidationRecord};

/// Verify a record's primary signature, and its backup signature when the
/// backup public key is known to the caller.
///
/// The wire format carries only the primary (Dilithium3) creator key, so
/// third parties can check the primary scheme alone; the backup (SPHINCS+)
/// signature is verifiable by holders of the creator's identity record.
pub fn verify_record(
    record: &ValidationRecord,
    backup_public_key: Option<&[u8]>,
) -> Result<(), ElaraError> {
    let signable = record.signable_bytes();
    dilithium::verify(&record.creator_public_key, &signable, &record.signature)?;

    if let (Some(backup_pk), Some(backup_sig)) = (backup_public_key, &record.backup_signature) {
        sphincs::verify(backup_pk, &signable, backup_sig)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use elara_core::types::{Classification, CryptoProfile, EntityType};
    use serde_json::Map;

    #[test]
    fn record_sign_verify_round_trip() {
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileA).unwrap();
        let mut record = ValidationRecord::create(
            b"a verifiable causal history".to_vec(),
            identity.public_key.clone(),
            vec![],
            Classification::Sovereign,
            Map::new(),
            None,
        );
        let signable = record.signable_bytes();
        record.signature = identity.sign(&signable).unwrap();
        record.backup_signature = Some(identity.sign_backup(&signable).unwrap());

        assert!(verify_record(&record, identity.backup_public_key.as_deref()).is_ok());
        assert!(verify_record(&record, None).is_ok());
    }

    #[test]
    fn tampered_record_fails_verification() {
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let mut record = ValidationRecord::create(
            b"original".to_vec(),
            identity.public_key.clone(),
            vec![],
            Classification::Public,
            Map::new(),
            None,
        );
        record.signature = identity.sign(&record.signable_bytes()).unwrap();

        record.content[0] ^= 0x01;
        assert!(matches!(
            verify_record(&record, None),
            Err(ElaraError::InvalidSignature)
        ));
    }
}
