//! Cognitive continuity chain — hash-chained, dual-signed state snapshots
//! stored in the DAG. Each checkpoint's sole parent is the previous
//! checkpoint, forming a verifiable linked list you can walk end to end.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

use elara_core::config::{write_atomic, DataPaths};
use elara_core::constants::{CHECKPOINT_COOLDOWN_SECS, MOOD_DELTA_THRESHOLD};
use elara_core::types::{Classification, RecordId};
use elara_core::{ElaraError, ValidationRecord};
use elara_cortex::events::{Event, EventBus, EventType};
use elara_cortex::payload::Payload;
use elara_crypto::Identity;
use elara_dag::LocalDAG;

use crate::digest::CognitiveStateProvider;
use crate::CONTINUITY_PRIORITY;

/// Metadata tag marking a record as a continuity checkpoint.
pub const CHECKPOINT_RECORD_TYPE: &str = "cognitive_checkpoint";

/// Events that trigger a checkpoint (mood changes are handled separately
/// with a delta filter).
const TRIGGER_EVENTS: &[EventType] = &[
    EventType::SessionEnded,
    EventType::PrincipleCrystallized,
    EventType::ModelCreated,
    EventType::DreamCompleted,
    EventType::BrainThinkingCompleted,
];

// ── Persisted chain state ────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct ChainStateFile {
    chain_head: Option<String>,
    chain_count: u64,
    created: Option<String>,
    last_checkpoint: Option<String>,
}

struct ChainState {
    head: Option<RecordId>,
    count: u64,
    created: Option<String>,
}

/// Chain status for CLI/diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct ChainStatus {
    pub chain_head: Option<String>,
    pub chain_count: u64,
    pub created: Option<String>,
    pub continuity_file: String,
}

// ── ContinuityChain ──────────────────────────────────────────────────────────

pub struct ContinuityChain {
    paths: DataPaths,
    identity: Arc<Identity>,
    dag: Arc<LocalDAG>,
    bus: Arc<EventBus>,
    provider: Box<dyn CognitiveStateProvider>,
    state: Mutex<ChainState>,
    last_checkpoint: Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl ContinuityChain {
    /// Load persisted chain state and build the chain. Call `setup` on the
    /// returned `Arc` to subscribe to trigger events.
    pub fn new(
        paths: DataPaths,
        identity: Arc<Identity>,
        dag: Arc<LocalDAG>,
        bus: Arc<EventBus>,
        provider: Box<dyn CognitiveStateProvider>,
    ) -> Arc<Self> {
        Self::with_cooldown(
            paths,
            identity,
            dag,
            bus,
            provider,
            Duration::from_secs_f64(CHECKPOINT_COOLDOWN_SECS),
        )
    }

    pub fn with_cooldown(
        paths: DataPaths,
        identity: Arc<Identity>,
        dag: Arc<LocalDAG>,
        bus: Arc<EventBus>,
        provider: Box<dyn CognitiveStateProvider>,
        cooldown: Duration,
    ) -> Arc<Self> {
        let state = load_state(&paths);
        tracing::info!(
            checkpoints = state.count,
            head = %state.head.map(|h| h.short()).unwrap_or_else(|| "none".into()),
            "continuity chain initialized"
        );
        Arc::new(Self {
            paths,
            identity,
            dag,
            bus,
            provider,
            state: Mutex::new(state),
            last_checkpoint: Mutex::new(None),
            cooldown,
        })
    }

    /// Subscribe to the trigger events, plus mood changes filtered by
    /// |delta| > 0.3.
    pub fn setup(self: &Arc<Self>) {
        for event_type in TRIGGER_EVENTS {
            let chain: Weak<ContinuityChain> = Arc::downgrade(self);
            self.bus.on(
                *event_type,
                move |event| {
                    if let Some(chain) = chain.upgrade() {
                        chain.on_trigger(event);
                    }
                },
                CONTINUITY_PRIORITY,
                Some("continuity_chain"),
            );
        }

        let chain: Weak<ContinuityChain> = Arc::downgrade(self);
        self.bus.on(
            EventType::MoodChanged,
            move |event| {
                if let Some(chain) = chain.upgrade() {
                    chain.on_mood_changed(event);
                }
            },
            CONTINUITY_PRIORITY,
            Some("continuity_chain"),
        );

        tracing::info!(triggers = TRIGGER_EVENTS.len() + 1, "continuity chain subscribed");
    }

    fn on_trigger(&self, event: &Event) {
        if !self.check_cooldown() {
            return;
        }
        if let Err(e) = self.checkpoint(event.event_type.as_str()) {
            tracing::error!(trigger = %event.event_type, error = %e, "checkpoint failed");
        }
    }

    fn on_mood_changed(&self, event: &Event) {
        let delta = event.data.mood_delta().unwrap_or(0.0);
        if delta.abs() <= MOOD_DELTA_THRESHOLD {
            return;
        }
        if !self.check_cooldown() {
            return;
        }
        if let Err(e) = self.checkpoint("mood_changed_significant") {
            tracing::error!(error = %e, "checkpoint failed on mood change");
        }
    }

    /// Monotonic-clock cooldown between accepted checkpoints.
    fn check_cooldown(&self) -> bool {
        let last = self.last_checkpoint.lock().expect("cooldown lock poisoned");
        match *last {
            Some(instant) if instant.elapsed() < self.cooldown => {
                tracing::debug!("checkpoint cooldown — skipping");
                false
            }
            _ => true,
        }
    }

    // ── Core: checkpoint ─────────────────────────────────────────────────────

    /// Create one continuity checkpoint: digest the cognitive state, wrap it
    /// in a record whose sole parent is the previous checkpoint, dual-sign,
    /// insert, persist the chain state, and announce it on the bus.
    pub fn checkpoint(&self, trigger: &str) -> Result<RecordId, ElaraError> {
        let digest = self.provider.digest();
        let digest_hash = digest.sha3_hex();
        let content = digest.to_canonical_json();

        let mut state = self.state.lock().expect("chain state lock poisoned");

        let mut metadata = Map::new();
        metadata.insert("record_type".into(), Value::String(CHECKPOINT_RECORD_TYPE.into()));
        metadata.insert("digest_hash".into(), Value::String(digest_hash.clone()));
        metadata.insert("sequence".into(), Value::from(state.count));
        metadata.insert("trigger".into(), Value::String(trigger.into()));
        metadata.insert(
            "previous_checkpoint".into(),
            state
                .head
                .map(|h| Value::String(h.to_hex()))
                .unwrap_or(Value::Null),
        );
        metadata.insert(
            "mood_vector".into(),
            Value::Array(
                [digest.mood_valence, digest.mood_energy, digest.mood_openness]
                    .iter()
                    .map(|v| Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null))
                    .collect(),
            ),
        );
        metadata.insert("memory_count".into(), Value::from(digest.memory_count));
        metadata.insert("model_count".into(), Value::from(digest.model_count));
        metadata.insert("prediction_count".into(), Value::from(digest.prediction_count));
        metadata.insert("principle_count".into(), Value::from(digest.principle_count));
        metadata.insert("correction_count".into(), Value::from(digest.correction_count));
        metadata.insert("active_goals".into(), Value::from(digest.active_goals));
        metadata.insert("session_count".into(), Value::from(digest.session_count));
        metadata.insert(
            "allostatic_load".into(),
            Number::from_f64(digest.allostatic_load)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );

        let parents = match state.head {
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

        self.dag.insert(&record, true)?;

        let sequence = state.count;
        state.head = Some(record.id);
        state.count += 1;
        if state.created.is_none() {
            state.created = Some(chrono::Utc::now().to_rfc3339());
        }
        save_state(&self.paths, &state);
        drop(state);

        *self.last_checkpoint.lock().expect("cooldown lock poisoned") = Some(Instant::now());

        self.bus.emit(
            EventType::ContinuityCheckpoint,
            Payload::from_value(json!({
                "record_id": record.id.to_hex(),
                "sequence": sequence,
                "digest_hash": digest_hash,
                "trigger": trigger,
            })),
            Some("continuity_chain"),
        );

        tracing::info!(sequence, trigger, record = %record.id.short(), "checkpoint written");
        Ok(record.id)
    }

    // ── Verification ─────────────────────────────────────────────────────────

    /// Walk the chain backwards from the stored head, verifying every link.
    /// Returns (valid, verified_count, breaks).
    pub fn verify_chain(&self) -> (bool, u64, Vec<String>) {
        let head = self.state.lock().expect("chain state lock poisoned").head;
        let Some(head) = head else {
            return (true, 0, vec![]);
        };

        let mut breaks = Vec::new();
        let mut verified = 0u64;
        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut current = Some(head);

        while let Some(current_id) = current {
            if !seen.insert(current_id) {
                breaks.push(format!("cycle detected at {}", current_id.short()));
                break;
            }

            let record = match self.dag.get(&current_id) {
                Ok(Some(record)) => record,
                Ok(None) | Err(_) => {
                    breaks.push(format!("record not found: {}", current_id.short()));
                    break;
                }
            };

            if record.metadata_str("record_type") != Some(CHECKPOINT_RECORD_TYPE) {
                breaks.push(format!(
                    "record {} is not a cognitive_checkpoint (type={})",
                    current_id.short(),
                    record.metadata_str("record_type").unwrap_or("?")
                ));
                break;
            }

            // Verify the backup signature too when this node is the creator.
            let backup_pk = (record.creator_public_key == self.identity.public_key)
                .then(|| self.identity.backup_public_key.as_deref())
                .flatten();
            if elara_crypto::verify_record(&record, backup_pk).is_err() {
                breaks.push(format!(
                    "invalid signature at checkpoint #{}",
                    record
                        .metadata
                        .get("sequence")
                        .and_then(Value::as_u64)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "?".into())
                ));
            }

            verified += 1;

            current = match record.metadata_str("previous_checkpoint") {
                Some(prev_hex) => match RecordId::from_hex(prev_hex) {
                    Ok(prev) => Some(prev),
                    Err(_) => {
                        breaks.push(format!(
                            "malformed previous_checkpoint on {}",
                            current_id.short()
                        ));
                        break;
                    }
                },
                None => None, // reached genesis
            };
        }

        (breaks.is_empty(), verified, breaks)
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub fn status(&self) -> ChainStatus {
        let state = self.state.lock().expect("chain state lock poisoned");
        ChainStatus {
            chain_head: state.head.map(|h| h.to_hex()),
            chain_count: state.count,
            created: state.created.clone(),
            continuity_file: self.paths.continuity_file().display().to_string(),
        }
    }

    pub fn head(&self) -> Option<RecordId> {
        self.state.lock().expect("chain state lock poisoned").head
    }

    pub fn count(&self) -> u64 {
        self.state.lock().expect("chain state lock poisoned").count
    }
}

fn load_state(paths: &DataPaths) -> ChainState {
    let parsed: Option<ChainStateFile> = std::fs::read_to_string(paths.continuity_file())
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok());

    match parsed {
        Some(file) => ChainState {
            head: file.chain_head.as_deref().and_then(|h| RecordId::from_hex(h).ok()),
            count: file.chain_count,
            created: file.created,
        },
        None => ChainState {
            head: None,
            count: 0,
            created: None,
        },
    }
}

fn save_state(paths: &DataPaths, state: &ChainState) {
    let file = ChainStateFile {
        chain_head: state.head.map(|h| h.to_hex()),
        chain_count: state.count,
        created: state.created.clone(),
        last_checkpoint: Some(chrono::Utc::now().to_rfc3339()),
    };
    let json = serde_json::to_string_pretty(&file).expect("chain state serialization is infallible");
    if let Err(e) = write_atomic(&paths.continuity_file(), json.as_bytes()) {
        tracing::error!(error = %e, "failed to save continuity state");
    }
}
