//! Cognitive digest — snapshot of the whole cognitive state at a point in
//! time, and the provider seam the continuity chain reads it through.

use serde::Serialize;
use serde_json::Value;

use elara_core::config::DataPaths;
use elara_core::record::canonical_json_bytes;
use elara_crypto::sha3_256;

/// Snapshot of cognitive state. Every field defaults to zero; a sparse
/// digest is better than no digest.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CognitiveDigest {
    // Mood
    pub mood_valence: f64,
    pub mood_energy: f64,
    pub mood_openness: f64,

    // Counts of persisted items
    pub memory_count: u64,
    pub model_count: u64,
    pub prediction_count: u64,
    pub principle_count: u64,
    pub correction_count: u64,

    // Session
    pub active_goals: u64,
    pub session_count: u64,

    pub allostatic_load: f64,

    /// ISO-8601 UTC stamp of when the snapshot was taken.
    pub timestamp: String,
}

impl CognitiveDigest {
    /// Deterministic JSON for hashing — sorted keys, no whitespace.
    pub fn to_canonical_json(&self) -> Vec<u8> {
        let value = serde_json::to_value(self).expect("digest serialization is infallible");
        canonical_json_bytes(&value)
    }

    /// SHA3-256 hex digest of the canonical JSON.
    pub fn sha3_hex(&self) -> String {
        hex::encode(sha3_256(&self.to_canonical_json()))
    }
}

/// Where the continuity chain gets its snapshots. Implementations must never
/// fail — unknown state reads as zero.
pub trait CognitiveStateProvider: Send + Sync {
    fn digest(&self) -> CognitiveDigest;
}

// ── File-backed provider ─────────────────────────────────────────────────────

/// Reads the collaborator-owned files under the data directory. Every probe
/// is individually fallible and falls back to the zero default, so lower
/// tiers with missing subsystems still produce a digest.
pub struct FileStateProvider {
    paths: DataPaths,
}

impl FileStateProvider {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    fn read_json(path: &std::path::Path) -> Option<Value> {
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn count_json_files(dir: &std::path::Path) -> u64 {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count() as u64
            })
            .unwrap_or(0)
    }

    fn count_json_list(path: &std::path::Path) -> u64 {
        match Self::read_json(path) {
            Some(Value::Array(items)) => items.len() as u64,
            _ => 0,
        }
    }
}

impl CognitiveStateProvider for FileStateProvider {
    fn digest(&self) -> CognitiveDigest {
        let mut digest = CognitiveDigest {
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..CognitiveDigest::default()
        };

        if let Some(state) = Self::read_json(&self.paths.state_file()) {
            let num = |key: &str| state.get(key).and_then(Value::as_f64).unwrap_or(0.0);
            digest.mood_valence = num("valence");
            digest.mood_energy = num("energy");
            digest.mood_openness = num("openness");
            digest.allostatic_load = num("allostatic_load");
        }

        digest.memory_count = Self::count_json_files(&self.paths.memories_dir());
        digest.model_count = Self::count_json_files(&self.paths.models_dir());
        digest.prediction_count = Self::count_json_files(&self.paths.predictions_dir());
        digest.principle_count = Self::count_json_list(&self.paths.principles_file());
        digest.correction_count = Self::count_json_list(&self.paths.corrections_file());

        if let Some(Value::Array(goals)) = Self::read_json(&self.paths.goals_file()) {
            digest.active_goals = goals
                .iter()
                .filter(|g| g.get("status").and_then(Value::as_str) == Some("active"))
                .count() as u64;
        }

        if let Some(presence) = Self::read_json(&self.paths.presence_file()) {
            digest.session_count = presence
                .get("total_sessions")
                .and_then(Value::as_u64)
                .unwrap_or(0);
        }

        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_paths(name: &str) -> DataPaths {
        let dir = std::env::temp_dir().join(format!("elara_digest_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        DataPaths::new(dir)
    }

    #[test]
    fn digest_hash_is_deterministic_and_content_sensitive() {
        let a = CognitiveDigest {
            mood_valence: 0.5,
            timestamp: "2026-01-01T00:00:00Z".into(),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a.sha3_hex(), b.sha3_hex());

        let c = CognitiveDigest {
            mood_valence: 0.6,
            timestamp: "2026-01-01T00:00:00Z".into(),
            ..Default::default()
        };
        assert_ne!(a.sha3_hex(), c.sha3_hex());
    }

    #[test]
    fn missing_files_read_as_zero() {
        let provider = FileStateProvider::new(temp_paths("empty"));
        let digest = provider.digest();
        assert_eq!(digest.memory_count, 0);
        assert_eq!(digest.model_count, 0);
        assert_eq!(digest.mood_valence, 0.0);
        assert_eq!(digest.session_count, 0);
    }

    #[test]
    fn populated_state_is_counted() {
        let paths = temp_paths("populated");

        std::fs::write(
            paths.state_file(),
            json!({"valence": 0.4, "energy": 0.7, "openness": 0.2, "allostatic_load": 0.15})
                .to_string(),
        )
        .unwrap();

        std::fs::create_dir_all(paths.models_dir()).unwrap();
        std::fs::write(paths.models_dir().join("m1.json"), "{}").unwrap();
        std::fs::write(paths.models_dir().join("m2.json"), "{}").unwrap();
        std::fs::write(paths.models_dir().join("notes.txt"), "ignored").unwrap();

        std::fs::write(
            paths.principles_file(),
            json!([{"id": 1}, {"id": 2}, {"id": 3}]).to_string(),
        )
        .unwrap();

        std::fs::write(
            paths.goals_file(),
            json!([
                {"status": "active"},
                {"status": "done"},
                {"status": "active"}
            ])
            .to_string(),
        )
        .unwrap();

        std::fs::write(paths.presence_file(), json!({"total_sessions": 42}).to_string()).unwrap();

        let digest = FileStateProvider::new(paths).digest();
        assert_eq!(digest.mood_valence, 0.4);
        assert_eq!(digest.allostatic_load, 0.15);
        assert_eq!(digest.model_count, 2);
        assert_eq!(digest.principle_count, 3);
        assert_eq!(digest.active_goals, 2);
        assert_eq!(digest.session_count, 42);
    }

    #[test]
    fn corrupt_files_fall_back_to_zero() {
        let paths = temp_paths("corrupt");
        std::fs::write(paths.state_file(), "not json at all").unwrap();
        std::fs::write(paths.principles_file(), "{\"not\": \"a list\"}").unwrap();

        let digest = FileStateProvider::new(paths).digest();
        assert_eq!(digest.mood_valence, 0.0);
        assert_eq!(digest.principle_count, 0);
    }
}
