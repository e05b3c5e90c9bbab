//! Layer 1 bridge — cryptographic validation of cognitive artifacts.
//!
//! Subscribes to creation events on the bus and turns each into a signed
//! `ValidationRecord` chained into the local DAG. Three guards run before
//! any signing: payload shape, a sliding-window rate limit, and per-session
//! dedup by artifact id. The bridge never raises through the bus; failures
//! land in counters.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Map, Number, Value};

use elara_core::constants::{DEDUP_MAX_ENTRIES, SUMMARY_MAX_CHARS};
use elara_core::record::canonical_json_bytes;
use elara_core::types::{Classification, RecordId, Timestamp};
use elara_core::{ElaraError, ValidationRecord};
use elara_cortex::events::{Event, EventBus, EventType};
use elara_cortex::payload::Payload;
use elara_crypto::Identity;
use elara_dag::LocalDAG;

use crate::BRIDGE_PRIORITY;

/// Creation events the bridge validates, with their artifact-type tags.
pub const VALIDATED_EVENTS: &[(EventType, &str)] = &[
    (EventType::ModelCreated, "model"),
    (EventType::PredictionMade, "prediction"),
    (EventType::PrincipleCrystallized, "principle"),
    (EventType::WorkflowCreated, "workflow"),
    (EventType::CorrectionAdded, "correction"),
    (EventType::DreamCompleted, "dream"),
    (EventType::EpisodeEnded, "episode"),
    (EventType::HandoffSaved, "handoff"),
    (EventType::SynthesisCreated, "synthesis"),
    (EventType::OutcomeRecorded, "outcome"),
];

fn artifact_type_for(event_type: EventType) -> Option<&'static str> {
    VALIDATED_EVENTS
        .iter()
        .find(|(e, _)| *e == event_type)
        .map(|(_, tag)| *tag)
}

// ── Metrics ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Metrics {
    processed: AtomicU64,
    failed_sign: AtomicU64,
    failed_dag: AtomicU64,
    skipped_dedup: AtomicU64,
    skipped_rate_limit: AtomicU64,
    skipped_invalid: AtomicU64,
}

/// Counters for bridge health monitoring.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct BridgeMetrics {
    pub processed: u64,
    pub failed_sign: u64,
    pub failed_dag: u64,
    pub skipped_dedup: u64,
    pub skipped_rate_limit: u64,
    pub skipped_invalid: u64,
}

impl Metrics {
    fn snapshot(&self) -> BridgeMetrics {
        BridgeMetrics {
            processed: self.processed.load(Ordering::SeqCst),
            failed_sign: self.failed_sign.load(Ordering::SeqCst),
            failed_dag: self.failed_dag.load(Ordering::SeqCst),
            skipped_dedup: self.skipped_dedup.load(Ordering::SeqCst),
            skipped_rate_limit: self.skipped_rate_limit.load(Ordering::SeqCst),
            skipped_invalid: self.skipped_invalid.load(Ordering::SeqCst),
        }
    }
}

/// One provenance hit for an artifact id.
#[derive(Clone, Debug, Serialize)]
pub struct ProvenanceEntry {
    pub record_id: String,
    pub timestamp: Timestamp,
    pub artifact_type: Option<String>,
    pub content_summary: String,
}

// ── Bridge ───────────────────────────────────────────────────────────────────

pub struct Layer1Bridge {
    identity: Arc<Identity>,
    dag: Arc<LocalDAG>,
    bus: Arc<EventBus>,
    /// Most recent record signed by this bridge; parent seed for the next.
    head: Mutex<Option<RecordId>>,
    seen_artifacts: Mutex<HashSet<String>>,
    rate_window: Mutex<VecDeque<Instant>>,
    rate_limit: usize,
    metrics: Metrics,
}

impl Layer1Bridge {
    /// Build the bridge, seeding the parent pointer from the DAG's canonical
    /// head.
    pub fn new(
        identity: Arc<Identity>,
        dag: Arc<LocalDAG>,
        bus: Arc<EventBus>,
        rate_limit: usize,
    ) -> Result<Arc<Self>, ElaraError> {
        let head = dag.head()?;
        tracing::info!(
            identity = %identity.identity_hash.short(),
            dag_records = dag.len(),
            "layer 1 bridge initialized"
        );
        Ok(Arc::new(Self {
            identity,
            dag,
            bus,
            head: Mutex::new(head),
            seen_artifacts: Mutex::new(HashSet::new()),
            rate_window: Mutex::new(VecDeque::new()),
            rate_limit,
            metrics: Metrics::default(),
        }))
    }

    /// Subscribe to the creation events. Handlers hold a weak back-reference
    /// so dropping the bridge detaches them.
    pub fn setup(self: &Arc<Self>) {
        for (event_type, _) in VALIDATED_EVENTS {
            let bridge: Weak<Layer1Bridge> = Arc::downgrade(self);
            self.bus.on(
                *event_type,
                move |event| {
                    if let Some(bridge) = bridge.upgrade() {
                        bridge.handle_event(event);
                    }
                },
                BRIDGE_PRIORITY,
                Some("layer1_bridge"),
            );
        }
        tracing::info!(events = VALIDATED_EVENTS.len(), "bridge subscribed");
    }

    // ── Guards ───────────────────────────────────────────────────────────────

    fn check_rate_limit(&self) -> bool {
        let now = Instant::now();
        let mut window = self.rate_window.lock().expect("rate window lock poisoned");
        while let Some(front) = window.front() {
            if now.duration_since(*front) > Duration::from_secs(60) {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.rate_limit {
            self.metrics.skipped_rate_limit.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(limit = self.rate_limit, "bridge rate limit exceeded");
            return false;
        }
        window.push_back(now);
        true
    }

    /// Skip if the artifact id was already signed this session.
    fn check_dedup(&self, artifact_id: &str) -> bool {
        if artifact_id.is_empty() {
            return true; // nothing to dedup on
        }
        let mut seen = self.seen_artifacts.lock().expect("dedup lock poisoned");
        if seen.contains(artifact_id) {
            self.metrics.skipped_dedup.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        if seen.len() >= DEDUP_MAX_ENTRIES {
            seen.clear();
        }
        seen.insert(artifact_id.to_string());
        true
    }

    // ── Event handling ───────────────────────────────────────────────────────

    fn handle_event(&self, event: &Event) {
        let Some(artifact_type) = artifact_type_for(event.event_type) else {
            return;
        };

        if !event.data.is_valid_mapping() {
            self.metrics.skipped_invalid.fetch_add(1, Ordering::SeqCst);
            return;
        }

        if !self.check_rate_limit() {
            return;
        }

        let metadata = self.build_metadata(artifact_type, &event.data);
        let artifact_id = metadata
            .get("artifact_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        if !self.check_dedup(&artifact_id) {
            return;
        }

        let content = build_artifact_content(event.event_type, &event.data);
        match self.validate(content, metadata) {
            Ok((record_id, record_hash)) => {
                self.metrics.processed.fetch_add(1, Ordering::SeqCst);
                self.bus.emit(
                    EventType::ArtifactValidated,
                    Payload::from_value(json!({
                        "record_id": record_id.to_hex(),
                        "record_hash": record_hash,
                        "artifact_type": artifact_type,
                        "artifact_id": artifact_id,
                    })),
                    Some("layer1_bridge"),
                );
            }
            Err(e) => match e {
                ElaraError::InvalidSignature | ElaraError::CryptoBackendMissing(_) => {
                    self.metrics.failed_sign.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(event = %event.event_type, error = %e, "bridge signing failed");
                }
                _ => {
                    self.metrics.failed_dag.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(event = %event.event_type, error = %e, "bridge DAG insert failed");
                }
            },
        }
    }

    fn build_metadata(&self, artifact_type: &str, payload: &Payload) -> Map<String, Value> {
        let summary: String = payload
            .summary()
            .unwrap_or_default()
            .chars()
            .take(SUMMARY_MAX_CHARS)
            .collect();

        let mut metadata = Map::new();
        metadata.insert("artifact_type".into(), Value::String(artifact_type.into()));
        metadata.insert(
            "artifact_id".into(),
            Value::String(payload.artifact_id().unwrap_or_default()),
        );
        metadata.insert(
            "domain".into(),
            Value::String(payload.domain().unwrap_or_else(|| "general".into())),
        );
        metadata.insert(
            "layer3_version".into(),
            Value::String(env!("CARGO_PKG_VERSION").into()),
        );
        metadata.insert("content_summary".into(), Value::String(summary));
        metadata.insert(
            "confidence".into(),
            Number::from_f64(payload.confidence().unwrap_or(1.0))
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        metadata.insert("zone".into(), Value::String("local".into()));
        metadata.insert("witness_count".into(), Value::from(0));
        metadata
    }

    /// Create, dual-sign, and store one validation record. Returns the
    /// record id and content hash.
    fn validate(
        &self,
        content: Vec<u8>,
        metadata: Map<String, Value>,
    ) -> Result<(RecordId, String), ElaraError> {
        let parents = match *self.head.lock().expect("head lock poisoned") {
            Some(head) => vec![head],
            None => vec![],
        };

        let mut record = ValidationRecord::create(
            content,
            self.identity.public_key.clone(),
            parents,
            Classification::Sovereign,
            metadata,
            None,
        );

        let signable = record.signable_bytes();
        record.signature = self.identity.sign(&signable)?;
        if self.identity.profile.dual_sign() {
            record.backup_signature = Some(self.identity.sign_backup(&signable)?);
        }

        let record_hash = self.dag.insert(&record, true)?;
        *self.head.lock().expect("head lock poisoned") = Some(record.id);

        tracing::debug!(record = %record.id.short(), "artifact validated");
        Ok((record.id, record_hash.to_hex()))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn metrics(&self) -> BridgeMetrics {
        self.metrics.snapshot()
    }

    pub fn head(&self) -> Option<RecordId> {
        *self.head.lock().expect("head lock poisoned")
    }

    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    pub fn dag(&self) -> &Arc<LocalDAG> {
        &self.dag
    }

    /// DAG statistics plus bridge counters and a truncated identity hash.
    pub fn stats(&self) -> Result<Value, ElaraError> {
        let dag_stats = self.dag.stats()?;
        Ok(json!({
            "dag": dag_stats,
            "identity": format!("{}...", self.identity.identity_hash.short()),
            "identity_entity": self.identity.entity_type.as_str(),
            "bridge_metrics": self.metrics.snapshot(),
        }))
    }

    /// All validation records this identity created for a given artifact id.
    pub fn provenance(&self, artifact_id: &str) -> Result<Vec<ProvenanceEntry>, ElaraError> {
        let records = self
            .dag
            .query(Some(&self.identity.public_key), None, 10_000)?;
        Ok(records
            .into_iter()
            .filter(|r| r.metadata_str("artifact_id") == Some(artifact_id))
            .map(|r| ProvenanceEntry {
                record_id: r.id.to_hex(),
                timestamp: r.timestamp,
                artifact_type: r.metadata_str("artifact_type").map(str::to_string),
                content_summary: r
                    .metadata_str("content_summary")
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    /// Close the DAG connection.
    pub fn teardown(&self) {
        if let Err(e) = self.dag.close() {
            tracing::error!(error = %e, "error closing DAG");
        } else {
            tracing::info!("layer 1 bridge shut down");
        }
    }
}

/// Deterministic content bytes for a creation event.
fn build_artifact_content(event_type: EventType, payload: &Payload) -> Vec<u8> {
    canonical_json_bytes(&json!({
        "event_type": event_type.as_str(),
        "data": payload.to_value(),
    }))
}
