//! JSON shapes of the HTTP surface and the persisted peer registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

use elara_core::config::NodeType;
use elara_core::types::Timestamp;

// ── HTTP DTOs ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub identity: String,
    pub entity_type: String,
    pub dag_records: u64,
    pub port: u16,
    pub node_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub record_id: String,
    pub record_hash: String,
    pub accepted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record_id: String,
    pub wire_hex: String,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub records: Vec<RecordSummary>,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WitnessResponse {
    pub record_id: String,
    pub witness: String,
    pub signature: String,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttestationSummary {
    pub witness_identity_hash: String,
    pub signature: String,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttestationsResponse {
    pub record_id: String,
    pub count: u64,
    pub trust_score: f64,
    pub trust_level: String,
    pub attestations: Vec<AttestationSummary>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Peer registry ────────────────────────────────────────────────────────────

/// One known peer, as persisted in `peers.json`. Discovery itself is a
/// collaborator concern; the core only reads and rewrites the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerEntry {
    pub identity_hash: String,
    pub host: String,
    pub port: u16,
    pub node_type: NodeType,
    pub last_seen: Option<Timestamp>,
}

pub fn load_peers(path: &Path) -> Vec<PeerEntry> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

pub fn save_peers(path: &Path, peers: &[PeerEntry]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(peers).expect("peer serialization is infallible");
    elara_core::config::write_atomic(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_round_trip_and_missing_file_reads_empty() {
        let dir = std::env::temp_dir().join(format!("elara_peers_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("peers.json");

        assert!(load_peers(&dir.join("absent.json")).is_empty());

        let peers = vec![PeerEntry {
            identity_hash: "ab".repeat(32),
            host: "127.0.0.1".into(),
            port: 9473,
            node_type: NodeType::Witness,
            last_seen: Some(1_700_000_000.0),
        }];
        save_peers(&path, &peers).unwrap();
        let loaded = load_peers(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].node_type, NodeType::Witness);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
