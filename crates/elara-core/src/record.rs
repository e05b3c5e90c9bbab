use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha3::{Digest, Sha3_256};

use crate::constants::WIRE_VERSION;
use crate::error::ElaraError;
use crate::types::{now_timestamp, Classification, ContentHash, RecordId, Timestamp};

/// Serialize a JSON value to canonical bytes: sorted keys (serde_json maps
/// are BTreeMap-backed), no whitespace, UTF-8. Stable across implementations.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("JSON value serialization is infallible")
}

// ── ValidationRecord ─────────────────────────────────────────────────────────

/// An immutable, content-addressed, signed statement.
///
/// The record id is SHA3-256 of `signable_bytes()`, which covers content,
/// creator, parents, classification, metadata, and timestamp — everything
/// except the signatures themselves. Signed exactly once by the creator,
/// inserted into a DAG at most once, never modified.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationRecord {
    /// SHA3-256 of the signable bytes.
    pub id: RecordId,

    /// Payload bytes; opaque to the core.
    pub content: Vec<u8>,

    /// Creator's primary (Dilithium3) public key.
    pub creator_public_key: Vec<u8>,

    /// Parent record ids. Empty for genesis or foreign-root records.
    pub parents: Vec<RecordId>,

    pub classification: Classification,

    /// Searchable-but-opaque key/value annotations.
    pub metadata: Map<String, Value>,

    /// Float seconds since epoch.
    pub timestamp: Timestamp,

    /// Primary (Dilithium3) signature over `signable_bytes()`. Empty until
    /// the creator signs.
    pub signature: Vec<u8>,

    /// Optional backup (SPHINCS+) signature over the same bytes.
    pub backup_signature: Option<Vec<u8>>,
}

impl ValidationRecord {
    /// Build an unsigned record. The id binds every field except the
    /// signatures; `timestamp` defaults to wall-clock seconds.
    pub fn create(
        content: Vec<u8>,
        creator_public_key: Vec<u8>,
        parents: Vec<RecordId>,
        classification: Classification,
        metadata: Map<String, Value>,
        timestamp: Option<Timestamp>,
    ) -> Self {
        let mut record = Self {
            id: RecordId::from_bytes([0u8; 32]),
            content,
            creator_public_key,
            parents,
            classification,
            metadata,
            timestamp: timestamp.unwrap_or_else(now_timestamp),
            signature: Vec::new(),
            backup_signature: None,
        };
        record.id = RecordId::from_bytes(sha3_256(&record.signable_bytes()));
        record
    }

    /// Deterministic serialization of everything except the signatures:
    /// sorted-key JSON, no whitespace, UTF-8. Input to signing, verification,
    /// and the record id.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert(
            "classification".into(),
            Value::String(self.classification.as_str().into()),
        );
        obj.insert("content".into(), Value::String(hex::encode(&self.content)));
        obj.insert(
            "creator".into(),
            Value::String(hex::encode(&self.creator_public_key)),
        );
        obj.insert("metadata".into(), Value::Object(self.metadata.clone()));
        obj.insert(
            "parents".into(),
            Value::Array(
                self.parents
                    .iter()
                    .map(|p| Value::String(p.to_hex()))
                    .collect(),
            ),
        );
        obj.insert(
            "timestamp".into(),
            Number::from_f64(self.timestamp)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        canonical_json_bytes(&Value::Object(obj))
    }

    /// Wire serialization including both signatures, version-prefixed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ElaraError> {
        let wire = WireRecord {
            version: WIRE_VERSION,
            id: self.id,
            content: self.content.clone(),
            creator_public_key: self.creator_public_key.clone(),
            parents: self.parents.clone(),
            classification: self.classification,
            metadata_json: canonical_json_bytes(&Value::Object(self.metadata.clone())),
            timestamp: self.timestamp,
            signature: self.signature.clone(),
            backup_signature: self.backup_signature.clone(),
        };
        bincode::serialize(&wire).map_err(|e| ElaraError::Serialization(e.to_string()))
    }

    /// Parse wire bytes back into a record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ElaraError> {
        let wire: WireRecord =
            bincode::deserialize(bytes).map_err(|e| ElaraError::RecordWire(e.to_string()))?;
        if wire.version != WIRE_VERSION {
            return Err(ElaraError::WireVersion(wire.version));
        }
        let metadata = match serde_json::from_slice::<Value>(&wire.metadata_json) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ElaraError::RecordWire("metadata is not an object".into())),
            Err(e) => return Err(ElaraError::RecordWire(e.to_string())),
        };
        Ok(Self {
            id: wire.id,
            content: wire.content,
            creator_public_key: wire.creator_public_key,
            parents: wire.parents,
            classification: wire.classification,
            metadata,
            timestamp: wire.timestamp,
            signature: wire.signature,
            backup_signature: wire.backup_signature,
        })
    }

    /// SHA3-256 of the canonical wire bytes. Distinct from the record id,
    /// which excludes signatures.
    pub fn content_hash(&self) -> Result<ContentHash, ElaraError> {
        Ok(ContentHash::from_bytes(sha3_256(&self.to_bytes()?)))
    }

    /// Convenience metadata accessor for string values.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// On-wire shape. Metadata travels as its canonical JSON bytes so the wire
/// stays pure bincode.
#[derive(Serialize, Deserialize)]
struct WireRecord {
    version: u8,
    id: RecordId,
    content: Vec<u8>,
    creator_public_key: Vec<u8>,
    parents: Vec<RecordId>,
    classification: Classification,
    metadata_json: Vec<u8>,
    timestamp: f64,
    signature: Vec<u8>,
    backup_signature: Option<Vec<u8>>,
}
