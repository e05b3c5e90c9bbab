//! Backup signature scheme: SPHINCS+ (SHA2-128f, simple). Hash-based, slower
//! than the lattice primary but resting on independent assumptions — a
//! record stays verifiable even if one scheme falls.

use pqcrypto_sphincsplus::sphincssha2128fsimple as sphincs;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};

use elara_core::ElaraError;

/// Sign `message` with a SPHINCS+ secret key. Returns a detached signature.
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<Vec<u8>, ElaraError> {
    let sk = sphincs::SecretKey::from_bytes(secret_key_bytes)
        .map_err(|_| ElaraError::InvalidSignature)?;
    let sig = sphincs::detached_sign(message, &sk);
    Ok(sig.as_bytes().to_vec())
}

/// Verify a detached SPHINCS+ signature.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), ElaraError> {
    let pk = sphincs::PublicKey::from_bytes(public_key).map_err(|_| {
        ElaraError::InvalidPublicKeyLength {
            expected: sphincs::public_key_bytes(),
            got: public_key.len(),
        }
    })?;
    let sig = sphincs::DetachedSignature::from_bytes(signature)
        .map_err(|_| ElaraError::InvalidSignature)?;
    sphincs::verify_detached_signature(&sig, message, &pk)
        .map_err(|_| ElaraError::InvalidSignature)
}

/// Generate a fresh SPHINCS+ keypair as (public, secret) byte vectors.
pub fn keypair() -> (Vec<u8>, Vec<u8>) {
    let (pk, sk) = sphincs::keypair();
    (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let (pk, sk) = keypair();
        let sig = sign(&sk, b"backup assumptions").unwrap();
        assert!(verify(&pk, b"backup assumptions", &sig).is_ok());
        assert!(verify(&pk, b"other message", &sig).is_err());
    }
}
