use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use elara_core::types::{ContentHash, RecordId, Timestamp};
use elara_core::{ElaraError, ValidationRecord};
use elara_crypto::hash::{content_hash_from_wire, sha3_256};

/// Persistent record DAG backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   records    — RecordId bytes               → wire bytes
///   parents    — child RecordId bytes         → bincode(Vec<RecordId>)
///   child_refs — parent bytes ++ child bytes  → [] (membership set)
///   by_time    — be micros (8) ++ id bytes    → id bytes
///   by_creator — sha3(creator pk) ++ id bytes → [] (membership set)
///
/// The record row is written last and is the commit point: ids that only
/// appear in index trees are invisible to `get`, `query`, and `tips`.
/// Writers are serialized by an internal mutex.
pub struct LocalDAG {
    _db: sled::Db,
    records: sled::Tree,
    parents: sled::Tree,
    child_refs: sled::Tree,
    by_time: sled::Tree,
    by_creator: sled::Tree,
    write_lock: Mutex<()>,
}

/// Aggregate counters for `stats()`.
#[derive(Clone, Debug, Serialize)]
pub struct DagStats {
    pub total_records: u64,
    pub total_edges: u64,
    pub roots: u64,
    pub oldest_timestamp: Option<Timestamp>,
    pub newest_timestamp: Option<Timestamp>,
}

fn storage_err(e: impl std::fmt::Display) -> ElaraError {
    ElaraError::Storage(e.to_string())
}

fn time_key(timestamp: Timestamp, id: &RecordId) -> Vec<u8> {
    let micros = (timestamp.max(0.0) * 1_000_000.0) as u64;
    let mut key = micros.to_be_bytes().to_vec();
    key.extend_from_slice(id.as_bytes());
    key
}

impl LocalDAG {
    /// Open or create the DAG store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElaraError> {
        let db = sled::open(path).map_err(storage_err)?;
        let records = db.open_tree("records").map_err(storage_err)?;
        let parents = db.open_tree("parents").map_err(storage_err)?;
        let child_refs = db.open_tree("child_refs").map_err(storage_err)?;
        let by_time = db.open_tree("by_time").map_err(storage_err)?;
        let by_creator = db.open_tree("by_creator").map_err(storage_err)?;
        Ok(Self {
            _db: db,
            records,
            parents,
            child_refs,
            by_time,
            by_creator,
            write_lock: Mutex::new(()),
        })
    }

    /// Insert a record and its parent edges. Idempotent on record id: a
    /// second insert returns the same content hash without touching rows.
    ///
    /// When `verify_signature` is set, the primary signature is checked
    /// against the embedded creator key first; a failed check rejects the
    /// record and leaves the store untouched. Parents need not exist locally
    /// — foreign parents are permitted placeholders for partial sync.
    pub fn insert(
        &self,
        record: &ValidationRecord,
        verify_signature: bool,
    ) -> Result<ContentHash, ElaraError> {
        if verify_signature {
            elara_crypto::verify_record(record, None)?;
        }

        let _guard = self.write_lock.lock().map_err(|_| {
            ElaraError::Storage("DAG write lock poisoned".into())
        })?;

        if let Some(existing) = self.records.get(record.id.as_bytes()).map_err(storage_err)? {
            return Ok(content_hash_from_wire(&existing));
        }

        let wire = record.to_bytes()?;

        for parent in &record.parents {
            let mut key = parent.as_bytes().to_vec();
            key.extend_from_slice(record.id.as_bytes());
            self.child_refs
                .insert(key, b"".as_ref())
                .map_err(storage_err)?;
        }

        let parent_bytes = bincode::serialize(&record.parents)
            .map_err(|e| ElaraError::Serialization(e.to_string()))?;
        self.parents
            .insert(record.id.as_bytes(), parent_bytes)
            .map_err(storage_err)?;

        self.by_time
            .insert(
                time_key(record.timestamp, &record.id),
                record.id.as_bytes().as_ref(),
            )
            .map_err(storage_err)?;

        let mut creator_key = sha3_256(&record.creator_public_key).to_vec();
        creator_key.extend_from_slice(record.id.as_bytes());
        self.by_creator
            .insert(creator_key, b"".as_ref())
            .map_err(storage_err)?;

        // Commit point.
        self.records
            .insert(record.id.as_bytes(), wire.as_slice())
            .map_err(storage_err)?;

        tracing::debug!(record = %record.id.short(), parents = record.parents.len(), "DAG insert");
        Ok(content_hash_from_wire(&wire))
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &RecordId) -> Result<Option<ValidationRecord>, ElaraError> {
        match self.records.get(id.as_bytes()).map_err(storage_err)? {
            Some(wire) => Ok(Some(ValidationRecord::from_bytes(&wire)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id.as_bytes()).unwrap_or(false)
    }

    /// Query records, most recent first, optionally filtered by creator key
    /// and by a strict lower timestamp bound.
    pub fn query(
        &self,
        creator_key: Option<&[u8]>,
        since: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<ValidationRecord>, ElaraError> {
        if let Some(creator) = creator_key {
            return self.query_by_creator(creator, since, limit);
        }

        let mut out = Vec::new();
        for item in self.by_time.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, id_bytes) = item.map_err(storage_err)?;
            let Some(record) = self.get_by_raw_id(&id_bytes)? else {
                continue;
            };
            if let Some(since) = since {
                if record.timestamp <= since {
                    // by_time is ordered; everything older follows.
                    break;
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    fn query_by_creator(
        &self,
        creator_key: &[u8],
        since: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<ValidationRecord>, ElaraError> {
        let prefix = sha3_256(creator_key);
        let mut out = Vec::new();
        for item in self.by_creator.scan_prefix(prefix) {
            let (key, _) = item.map_err(storage_err)?;
            let id_bytes = &key[32..];
            let Some(record) = self.get_by_raw_id(id_bytes)? else {
                continue;
            };
            if record.creator_public_key != creator_key {
                continue; // hash-prefix collision guard
            }
            if let Some(since) = since {
                if record.timestamp <= since {
                    continue;
                }
            }
            out.push(record);
        }
        out.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    fn get_by_raw_id(&self, id_bytes: &[u8]) -> Result<Option<ValidationRecord>, ElaraError> {
        match self.records.get(id_bytes).map_err(storage_err)? {
            Some(wire) => Ok(Some(ValidationRecord::from_bytes(&wire)?)),
            None => Ok(None),
        }
    }

    /// Record ids with no local children, oldest first. The last entry is
    /// the canonical head used to seed new parent links.
    pub fn tips(&self) -> Result<Vec<RecordId>, ElaraError> {
        let mut tips = Vec::new();
        for item in self.by_time.iter() {
            let (_, id_bytes) = item.map_err(storage_err)?;
            if !self.records.contains_key(&id_bytes).map_err(storage_err)? {
                continue;
            }
            let has_child = self
                .child_refs
                .scan_prefix(&id_bytes)
                .next()
                .transpose()
                .map_err(storage_err)?
                .is_some();
            if !has_child {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&id_bytes);
                tips.push(RecordId::from_bytes(arr));
            }
        }
        Ok(tips)
    }

    /// The canonical head: the most recent tip, if any.
    pub fn head(&self) -> Result<Option<RecordId>, ElaraError> {
        Ok(self.tips()?.pop())
    }

    /// Counts and timestamp bounds.
    pub fn stats(&self) -> Result<DagStats, ElaraError> {
        let mut total_edges = 0u64;
        let mut roots = 0u64;
        for item in self.parents.iter() {
            let (id_bytes, parent_bytes) = item.map_err(storage_err)?;
            if !self.records.contains_key(&id_bytes).map_err(storage_err)? {
                continue;
            }
            let parents: Vec<RecordId> = bincode::deserialize(&parent_bytes)
                .map_err(|e| ElaraError::Serialization(e.to_string()))?;
            total_edges += parents.len() as u64;
            if parents.is_empty() {
                roots += 1;
            }
        }

        let bound = |entry: Option<Result<(sled::IVec, sled::IVec), sled::Error>>| {
            entry
                .transpose()
                .ok()
                .flatten()
                .map(|(key, _)| {
                    let mut micros = [0u8; 8];
                    micros.copy_from_slice(&key[..8]);
                    u64::from_be_bytes(micros) as f64 / 1_000_000.0
                })
        };

        Ok(DagStats {
            total_records: self.records.len() as u64,
            total_edges,
            roots,
            oldest_timestamp: bound(self.by_time.iter().next()),
            newest_timestamp: bound(self.by_time.iter().next_back()),
        })
    }

    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush pending writes and release the store.
    pub fn close(&self) -> Result<(), ElaraError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elara_core::types::{Classification, CryptoProfile, EntityType};
    use elara_crypto::Identity;
    use serde_json::Map;

    fn temp_dag(name: &str) -> LocalDAG {
        let dir = std::env::temp_dir().join(format!(
            "elara_dag_{}_{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        LocalDAG::open(&dir).unwrap()
    }

    fn signed_record(
        identity: &Identity,
        content: &[u8],
        parents: Vec<RecordId>,
        timestamp: f64,
    ) -> ValidationRecord {
        let mut record = ValidationRecord::create(
            content.to_vec(),
            identity.public_key.clone(),
            parents,
            Classification::Sovereign,
            Map::new(),
            Some(timestamp),
        );
        record.signature = identity.sign(&record.signable_bytes()).unwrap();
        record
    }

    #[test]
    fn insert_and_get_round_trip() {
        let dag = temp_dag("round_trip");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let record = signed_record(&identity, b"r1", vec![], 100.0);

        dag.insert(&record, true).unwrap();
        let fetched = dag.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.content, b"r1");
        assert_eq!(fetched.signature, record.signature);
    }

    #[test]
    fn insert_is_idempotent() {
        let dag = temp_dag("idempotent");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let record = signed_record(&identity, b"once", vec![], 100.0);

        let h1 = dag.insert(&record, true).unwrap();
        let h2 = dag.insert(&record, true).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(dag.len(), 1);
        assert_eq!(dag.stats().unwrap().total_records, 1);
    }

    #[test]
    fn invalid_signature_rejected_without_insert() {
        let dag = temp_dag("bad_sig");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let mut record = signed_record(&identity, b"payload", vec![], 100.0);
        record.content[0] ^= 0xff; // tamper after signing

        assert!(matches!(
            dag.insert(&record, true),
            Err(ElaraError::InvalidSignature)
        ));
        assert_eq!(dag.len(), 0);
    }

    #[test]
    fn child_removes_parent_from_tips() {
        let dag = temp_dag("tips");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let r1 = signed_record(&identity, b"r1", vec![], 100.0);
        dag.insert(&r1, true).unwrap();
        let r2 = signed_record(&identity, b"r2", vec![r1.id], 200.0);
        dag.insert(&r2, true).unwrap();

        let tips = dag.tips().unwrap();
        assert_eq!(tips, vec![r2.id]);
        assert_eq!(dag.head().unwrap(), Some(r2.id));
    }

    #[test]
    fn foreign_parent_is_a_permitted_placeholder() {
        let dag = temp_dag("foreign_parent");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let phantom = RecordId::from_bytes([0xAB; 32]);
        let record = signed_record(&identity, b"partial sync", vec![phantom], 100.0);

        dag.insert(&record, true).unwrap();
        assert!(dag.get(&phantom).unwrap().is_none());
        assert_eq!(dag.tips().unwrap(), vec![record.id]);
    }

    #[test]
    fn query_is_most_recent_first_with_limit_and_since() {
        let dag = temp_dag("query");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        for (i, ts) in [100.0, 200.0, 300.0].iter().enumerate() {
            let record = signed_record(&identity, format!("r{i}").as_bytes(), vec![], *ts);
            dag.insert(&record, true).unwrap();
        }

        let recent = dag.query(None, None, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, 300.0);
        assert_eq!(recent[1].timestamp, 200.0);

        let since = dag.query(None, Some(150.0), 10).unwrap();
        assert_eq!(since.len(), 2);
        assert!(since.iter().all(|r| r.timestamp > 150.0));
    }

    #[test]
    fn query_filters_by_creator() {
        let dag = temp_dag("creator");
        let alice = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let bob = Identity::generate(EntityType::Human, CryptoProfile::ProfileB).unwrap();
        dag.insert(&signed_record(&alice, b"a", vec![], 100.0), true)
            .unwrap();
        dag.insert(&signed_record(&bob, b"b", vec![], 200.0), true)
            .unwrap();

        let records = dag.query(Some(&alice.public_key), None, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, b"a");
    }

    #[test]
    fn stats_counts_records_edges_roots() {
        let dag = temp_dag("stats");
        let identity = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
        let r1 = signed_record(&identity, b"r1", vec![], 100.0);
        dag.insert(&r1, true).unwrap();
        let r2 = signed_record(&identity, b"r2", vec![r1.id], 200.0);
        dag.insert(&r2, true).unwrap();

        let stats = dag.stats().unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.roots, 1);
        assert_eq!(stats.oldest_timestamp, Some(100.0));
        assert_eq!(stats.newest_timestamp, Some(200.0));
    }
}
