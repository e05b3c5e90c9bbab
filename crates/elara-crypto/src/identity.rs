use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use elara_core::types::{now_timestamp, CryptoProfile, EntityType, IdentityHash, Timestamp};
use elara_core::ElaraError;

use crate::hash::identity_hash_from_keys;
use crate::{dilithium, sphincs};

/// A node's signing authority: Dilithium3 primary keys, optional SPHINCS+
/// backup keys, and the SHA3-256 identity hash that names the node.
///
/// Generated once at bootstrap, persisted at mode 0600, loaded on every
/// start, never mutated. Secret key bytes are wiped on drop.
pub struct Identity {
    pub entity_type: EntityType,
    pub profile: CryptoProfile,
    pub public_key: Vec<u8>,
    secret_key: Vec<u8>,
    pub backup_public_key: Option<Vec<u8>>,
    backup_secret_key: Option<Vec<u8>>,
    pub created_at: Timestamp,
    pub identity_hash: IdentityHash,
}

impl Identity {
    /// Generate fresh keypairs for the primary scheme, and the backup scheme
    /// when `profile` selects dual signing.
    pub fn generate(entity_type: EntityType, profile: CryptoProfile) -> Result<Self, ElaraError> {
        let (public_key, secret_key) = dilithium::keypair();

        let (backup_public_key, backup_secret_key) = if profile.dual_sign() {
            let (pk, sk) = sphincs::keypair();
            (Some(pk), Some(sk))
        } else {
            (None, None)
        };

        let identity_hash = identity_hash_from_keys(
            entity_type.as_str(),
            profile.as_str(),
            &public_key,
            backup_public_key.as_deref(),
        );

        Ok(Self {
            entity_type,
            profile,
            public_key,
            secret_key,
            backup_public_key,
            backup_secret_key,
            created_at: now_timestamp(),
            identity_hash,
        })
    }

    /// Sign with the primary (Dilithium3) key.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ElaraError> {
        dilithium::sign(&self.secret_key, message)
    }

    /// Sign with the backup (SPHINCS+) key. Fails unless the profile carries
    /// backup keys.
    pub fn sign_backup(&self, message: &[u8]) -> Result<Vec<u8>, ElaraError> {
        let sk = self
            .backup_secret_key
            .as_deref()
            .ok_or(ElaraError::CryptoBackendMissing("no backup key in profile"))?;
        sphincs::sign(sk, message)
    }

    /// Serialize secret material to `path`, restricted to owner-only.
    pub fn save(&self, path: &Path) -> Result<(), ElaraError> {
        let file = IdentityFile {
            entity_type: self.entity_type,
            profile: self.profile,
            public_key: hex::encode(&self.public_key),
            secret_key: hex::encode(&self.secret_key),
            backup_public_key: self.backup_public_key.as_ref().map(hex::encode),
            backup_secret_key: self.backup_secret_key.as_ref().map(hex::encode),
            created_at: self.created_at,
            identity_hash: self.identity_hash.to_hex(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ElaraError::Serialization(e.to_string()))?;

        elara_core::config::write_atomic(path, json.as_bytes())
            .map_err(|e| ElaraError::IdentityIo(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ElaraError::IdentityIo(e.to_string()))?;
        }
        Ok(())
    }

    /// Load an identity previously written with `save`.
    pub fn load(path: &Path) -> Result<Self, ElaraError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| ElaraError::IdentityIo(e.to_string()))?;
        let file: IdentityFile =
            serde_json::from_str(&json).map_err(|e| ElaraError::Serialization(e.to_string()))?;

        let decode =
            |s: &str| hex::decode(s).map_err(|e| ElaraError::Serialization(e.to_string()));

        let public_key = decode(&file.public_key)?;
        let backup_public_key = file
            .backup_public_key
            .as_deref()
            .map(decode)
            .transpose()?;

        // Recompute rather than trust the stored hash.
        let identity_hash = identity_hash_from_keys(
            file.entity_type.as_str(),
            file.profile.as_str(),
            &public_key,
            backup_public_key.as_deref(),
        );

        Ok(Self {
            entity_type: file.entity_type,
            profile: file.profile,
            public_key,
            secret_key: decode(&file.secret_key)?,
            backup_public_key,
            backup_secret_key: file.backup_secret_key.as_deref().map(decode).transpose()?,
            created_at: file.created_at,
            identity_hash,
        })
    }

    /// Load the identity at `path`, or generate-and-save a fresh one.
    pub fn load_or_generate(
        path: &Path,
        entity_type: EntityType,
        profile: CryptoProfile,
    ) -> Result<Self, ElaraError> {
        if path.exists() {
            let identity = Self::load(path)?;
            tracing::info!(identity = %identity.identity_hash.short(), "loaded identity");
            return Ok(identity);
        }
        let identity = Self::generate(entity_type, profile)?;
        identity.save(path)?;
        tracing::info!(identity = %identity.identity_hash.short(), "generated new identity");
        Ok(identity)
    }
}

impl Drop for Identity {
    fn drop(&mut self) {
        self.secret_key.zeroize();
        if let Some(sk) = self.backup_secret_key.as_mut() {
            sk.zeroize();
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Identity {{ entity_type: {:?}, profile: {:?}, hash: {} }}",
            self.entity_type,
            self.profile,
            self.identity_hash.short()
        )
    }
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    entity_type: EntityType,
    profile: CryptoProfile,
    public_key: String,
    secret_key: String,
    backup_public_key: Option<String>,
    backup_secret_key: Option<String>,
    created_at: Timestamp,
    identity_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("elara_identity_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn generate_profile_a_has_backup_keys() {
        let id = Identity::generate(EntityType::Ai, CryptoProfile::ProfileA).unwrap();
        assert!(id.backup_public_key.is_some());
        assert!(id.sign_backup(b"m").is_ok());
    }

    #[test]
    fn generate_profile_b_refuses_backup_sign() {
        let id = Identity::generate(EntityType::Service, CryptoProfile::ProfileB).unwrap();
        assert!(id.backup_public_key.is_none());
        assert!(matches!(
            id.sign_backup(b"m"),
            Err(ElaraError::CryptoBackendMissing(_))
        ));
    }

    #[test]
    fn save_load_round_trip_preserves_hash() {
        let path = temp_path("identity.json");
        let id = Identity::generate(EntityType::Ai, CryptoProfile::ProfileA).unwrap();
        id.save(&path).unwrap();

        let loaded = Identity::load(&path).unwrap();
        assert_eq!(loaded.identity_hash, id.identity_hash);

        // Loaded identity can still sign, and the original key verifies it.
        let sig = loaded.sign(b"persisted").unwrap();
        assert!(crate::dilithium::verify(&id.public_key, b"persisted", &sig).is_ok());

        let _ = std::fs::remove_file(&path);
    }

    #[cfg(unix)]
    #[test]
    fn saved_identity_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let path = temp_path("identity_perms.json");
        let id = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        id.save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let _ = std::fs::remove_file(&path);
    }
}
