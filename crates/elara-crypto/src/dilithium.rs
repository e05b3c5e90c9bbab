//! Primary signature scheme: Dilithium3 (NIST FIPS 204 family). Large keys,
//! fast verification — the scheme every peer can check from wire bytes alone.

use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};

use elara_core::ElaraError;

/// Sign `message` with a Dilithium3 secret key. Returns a detached signature.
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<Vec<u8>, ElaraError> {
    let sk = dilithium3::SecretKey::from_bytes(secret_key_bytes)
        .map_err(|_| ElaraError::InvalidSignature)?;
    let sig = dilithium3::detached_sign(message, &sk);
    Ok(sig.as_bytes().to_vec())
}

/// Verify a detached Dilithium3 signature.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), ElaraError> {
    let pk = dilithium3::PublicKey::from_bytes(public_key).map_err(|_| {
        ElaraError::InvalidPublicKeyLength {
            expected: dilithium3::public_key_bytes(),
            got: public_key.len(),
        }
    })?;
    let sig = dilithium3::DetachedSignature::from_bytes(signature)
        .map_err(|_| ElaraError::InvalidSignature)?;
    dilithium3::verify_detached_signature(&sig, message, &pk)
        .map_err(|_| ElaraError::InvalidSignature)
}

/// Generate a fresh Dilithium3 keypair as (public, secret) byte vectors.
pub fn keypair() -> (Vec<u8>, Vec<u8>) {
    let (pk, sk) = dilithium3::keypair();
    (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
}
