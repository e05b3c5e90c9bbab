use sha3::{Digest, Sha3_256};

use elara_core::types::{ContentHash, IdentityHash};

/// Compute SHA3-256 of arbitrary bytes → 32-byte array.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the content hash of a record from its canonical wire bytes.
pub fn content_hash_from_wire(wire_bytes: &[u8]) -> ContentHash {
    ContentHash::from_bytes(sha3_256(wire_bytes))
}

/// Derive an identity hash from the canonical concatenation of entity-type
/// tag, profile tag, primary public key, and backup public key.
pub fn identity_hash_from_keys(
    entity_type: &str,
    profile: &str,
    public_key: &[u8],
    backup_public_key: Option<&[u8]>,
) -> IdentityHash {
    let mut hasher = Sha3_256::new();
    hasher.update(entity_type.as_bytes());
    hasher.update(b":");
    hasher.update(profile.as_bytes());
    hasher.update(b":");
    hasher.update(public_key);
    hasher.update(b":");
    if let Some(backup) = backup_public_key {
        hasher.update(backup);
    }
    IdentityHash::from_bytes(hasher.finalize().into())
}
