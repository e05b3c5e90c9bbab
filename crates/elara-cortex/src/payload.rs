use serde_json::{Map, Number, Value};

/// Payload keys that may carry an artifact id, in lookup order.
const ARTIFACT_ID_KEYS: &[&str] = &[
    "id",
    "artifact_id",
    "model_id",
    "prediction_id",
    "principle_id",
    "workflow_id",
    "correction_id",
    "synthesis_id",
    "outcome_id",
    "episode_id",
];

/// Payload keys that may carry descriptive text, in lookup order.
const SUMMARY_KEYS: &[&str] = &["summary", "statement", "description", "title", "task", "concept"];

/// Structured creation-event payload. Emitting subsystems that know their
/// shape use this instead of a raw map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArtifactInfo {
    /// Stable id of the artifact across events; used for dedup.
    pub id: String,
    /// Human-readable one-liner.
    pub summary: String,
    pub domain: Option<String>,
    pub confidence: Option<f64>,
    /// Anything else the emitter wants signed along.
    pub extra: Map<String, Value>,
}

/// Event payload: one structured variant per payload family the core reads,
/// plus a key/value fallback for forward compatibility.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Artifact(ArtifactInfo),
    MoodDelta {
        valence: f64,
        energy: f64,
        openness: f64,
        delta: f64,
    },
    Map(Map<String, Value>),
    Empty,
}

impl Payload {
    /// Build a map payload from a JSON object literal.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) if !map.is_empty() => Payload::Map(map),
            _ => Payload::Empty,
        }
    }

    /// The bridge's first guard: payloads must be nonempty mappings.
    pub fn is_valid_mapping(&self) -> bool {
        match self {
            Payload::Artifact(_) | Payload::MoodDelta { .. } => true,
            Payload::Map(map) => !map.is_empty(),
            Payload::Empty => false,
        }
    }

    /// Artifact id: structured field, or first non-empty id-like key.
    pub fn artifact_id(&self) -> Option<String> {
        match self {
            Payload::Artifact(info) if !info.id.is_empty() => Some(info.id.clone()),
            Payload::Map(map) => ARTIFACT_ID_KEYS.iter().find_map(|key| {
                match map.get(*key) {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                }
            }),
            _ => None,
        }
    }

    /// Most descriptive text field, untruncated.
    pub fn summary(&self) -> Option<String> {
        match self {
            Payload::Artifact(info) if !info.summary.is_empty() => Some(info.summary.clone()),
            Payload::Map(map) => SUMMARY_KEYS.iter().find_map(|key| {
                map.get(*key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            }),
            _ => None,
        }
    }

    pub fn domain(&self) -> Option<String> {
        match self {
            Payload::Artifact(info) => info.domain.clone(),
            Payload::Map(map) => map.get("domain").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Payload::Artifact(info) => info.confidence,
            Payload::Map(map) => map.get("confidence").and_then(Value::as_f64),
            _ => None,
        }
    }

    /// Reported mood delta, for the continuity trigger filter.
    pub fn mood_delta(&self) -> Option<f64> {
        match self {
            Payload::MoodDelta { delta, .. } => Some(*delta),
            Payload::Map(map) => map.get("delta").and_then(Value::as_f64),
            _ => None,
        }
    }

    /// Canonical JSON representation — the shape that gets signed.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Artifact(info) => {
                let mut obj = info.extra.clone();
                obj.insert("id".into(), Value::String(info.id.clone()));
                obj.insert("summary".into(), Value::String(info.summary.clone()));
                if let Some(domain) = &info.domain {
                    obj.insert("domain".into(), Value::String(domain.clone()));
                }
                if let Some(confidence) = info.confidence {
                    if let Some(n) = Number::from_f64(confidence) {
                        obj.insert("confidence".into(), Value::Number(n));
                    }
                }
                Value::Object(obj)
            }
            Payload::MoodDelta {
                valence,
                energy,
                openness,
                delta,
            } => {
                let mut obj = Map::new();
                let mut put = |k: &str, v: f64| {
                    if let Some(n) = Number::from_f64(v) {
                        obj.insert(k.into(), Value::Number(n));
                    }
                };
                put("valence", *valence);
                put("energy", *energy);
                put("openness", *openness);
                put("delta", *delta);
                Value::Object(obj)
            }
            Payload::Map(map) => Value::Object(map.clone()),
            Payload::Empty => Value::Object(Map::new()),
        }
    }
}
