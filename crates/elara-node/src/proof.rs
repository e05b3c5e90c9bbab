//! External proof files — `<file>.elara.proof` carries everything a third
//! party needs to check a signed file: the record's wire bytes plus the
//! content hash of the file itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const PROOF_SUFFIX: &str = ".elara.proof";

#[derive(Serialize, Deserialize)]
pub struct ProofFile {
    pub record_id: String,
    /// SHA3-256 of the signed file's content.
    pub content_hash: String,
    /// Creator's identity hash.
    pub creator: String,
    pub classification: String,
    pub filename: String,
    /// Hex-encoded record wire bytes.
    pub wire_bytes: String,
}

impl ProofFile {
    pub fn path_for(file: &Path) -> PathBuf {
        let mut name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(PROOF_SUFFIX);
        file.with_file_name(name)
    }

    /// The companion file a proof refers to, next to the proof itself.
    pub fn companion_path(proof_path: &Path) -> Option<PathBuf> {
        let name = proof_path.file_name()?.to_string_lossy();
        let stem = name.strip_suffix(PROOF_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }
        Some(proof_path.with_file_name(stem.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_path_round_trips() {
        let file = PathBuf::from("/work/foo.txt");
        let proof = ProofFile::path_for(&file);
        assert_eq!(proof, PathBuf::from("/work/foo.txt.elara.proof"));
        assert_eq!(ProofFile::companion_path(&proof), Some(file));
    }

    #[test]
    fn non_proof_name_has_no_companion() {
        assert_eq!(ProofFile::companion_path(Path::new("/work/foo.txt")), None);
    }
}
