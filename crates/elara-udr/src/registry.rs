//! Decision registry storage and the in-memory fast path.
//!
//! WRITE-TIME: corrections/outcomes/manual → sled upserts.
//! BOOT-TIME:  rejected/failed signatures loaded into a set.
//! PROMPT-TIME: substring scan against the set, O(known entities).

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use elara_core::ElaraError;

/// Judgment attached to an action signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Rejected,
    Failed,
    Approved,
    Revisit,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Rejected => "rejected",
            Verdict::Failed => "failed",
            Verdict::Approved => "approved",
            Verdict::Revisit => "revisit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rejected" => Some(Verdict::Rejected),
            "failed" => Some(Verdict::Failed),
            "approved" => Some(Verdict::Approved),
            "revisit" => Some(Verdict::Revisit),
            _ => None,
        }
    }

    /// Verdicts that place a signature on the prompt-time block list.
    fn blocks(&self) -> bool {
        matches!(self, Verdict::Rejected | Verdict::Failed)
    }
}

/// Where a decision came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Manual,
    Corrections,
    Outcomes,
}

/// One crystallized judgment. One row per action signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// `domain:entity`, lowercased and trimmed.
    pub action_signature: String,
    pub verdict: Verdict,
    /// In [0, 1]; bumped +0.1 on every re-recording, capped at 1.0.
    pub confidence: f64,
    pub reason: String,
    pub source: Source,
    pub session: Option<u64>,
    pub tags: Vec<String>,
    pub created: String,
    pub updated: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegistryStats {
    pub total: u64,
    pub rejected: u64,
    pub failed: u64,
    pub approved: u64,
    pub revisit: u64,
    pub blocked_entities: usize,
}

/// Synthesize the canonical action signature.
pub fn action_signature(domain: &str, entity: &str) -> String {
    format!(
        "{}:{}",
        domain.trim().to_lowercase(),
        entity.trim().to_lowercase()
    )
}

fn storage_err(e: impl std::fmt::Display) -> ElaraError {
    ElaraError::Storage(e.to_string())
}

/// Sled-backed idempotent set of crystallized decisions with an in-memory
/// fast path for prompt-time scans.
pub struct DecisionRegistry {
    _db: sled::Db,
    decisions: sled::Tree,
    /// Signatures with a blocking verdict, for O(1) membership checks.
    blocked: RwLock<HashSet<String>>,
}

impl DecisionRegistry {
    /// Open the registry and boot the fast-path set.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElaraError> {
        let db = sled::open(path).map_err(storage_err)?;
        let decisions = db.open_tree("decisions").map_err(storage_err)?;
        let registry = Self {
            _db: db,
            decisions,
            blocked: RwLock::new(HashSet::new()),
        };
        registry.boot_decisions()?;
        Ok(registry)
    }

    /// Rebuild the in-memory blocked set from the store. Returns its size.
    pub fn boot_decisions(&self) -> Result<usize, ElaraError> {
        let mut set = HashSet::new();
        for item in self.decisions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let entry: DecisionEntry = bincode::deserialize(&bytes)
                .map_err(|e| ElaraError::Serialization(e.to_string()))?;
            if entry.verdict.blocks() {
                set.insert(entry.action_signature);
            }
        }
        let size = set.len();
        *self.blocked.write().expect("blocked set lock poisoned") = set;
        tracing::info!(blocked = size, "decision registry booted");
        Ok(size)
    }

    /// Upsert a decision. Re-recording an existing signature bumps its
    /// confidence by 0.1 (capped at 1.0) and overwrites verdict, reason, and
    /// the updated stamp.
    #[allow(clippy::too_many_arguments)]
    pub fn record_decision(
        &self,
        domain: &str,
        entity: &str,
        verdict: Verdict,
        confidence: f64,
        reason: &str,
        source: Source,
        session: Option<u64>,
        tags: Vec<String>,
    ) -> Result<DecisionEntry, ElaraError> {
        let signature = action_signature(domain, entity);
        let now = chrono::Utc::now().to_rfc3339();

        let entry = match self.get_raw(&signature)? {
            Some(existing) => DecisionEntry {
                confidence: (existing.confidence + 0.1).min(1.0),
                verdict,
                reason: reason.to_string(),
                source,
                session: session.or(existing.session),
                tags: if tags.is_empty() { existing.tags } else { tags },
                updated: now,
                created: existing.created,
                action_signature: signature.clone(),
            },
            None => DecisionEntry {
                action_signature: signature.clone(),
                verdict,
                confidence: confidence.clamp(0.0, 1.0),
                reason: reason.to_string(),
                source,
                session,
                tags,
                created: now.clone(),
                updated: now,
            },
        };

        let bytes = bincode::serialize(&entry)
            .map_err(|e| ElaraError::Serialization(e.to_string()))?;
        self.decisions
            .insert(signature.as_bytes(), bytes)
            .map_err(storage_err)?;

        let mut blocked = self.blocked.write().expect("blocked set lock poisoned");
        if entry.verdict.blocks() {
            blocked.insert(signature);
        } else {
            blocked.remove(&signature);
        }

        Ok(entry)
    }

    fn get_raw(&self, signature: &str) -> Result<Option<DecisionEntry>, ElaraError> {
        match self.decisions.get(signature.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes)
                    .map_err(|e| ElaraError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Single lookup by domain + entity.
    pub fn check_decision(
        &self,
        domain: &str,
        entity: &str,
    ) -> Result<Option<DecisionEntry>, ElaraError> {
        self.get_raw(&action_signature(domain, entity))
    }

    /// Case-insensitive substring scan of `text` against every blocked
    /// entity. Returns at most two hits.
    pub fn check_entities(&self, text: &str) -> Vec<DecisionEntry> {
        let haystack = text.to_lowercase();
        let blocked = self.blocked.read().expect("blocked set lock poisoned");
        let mut hits = Vec::new();
        for signature in blocked.iter() {
            let entity = signature.split_once(':').map(|(_, e)| e).unwrap_or(signature);
            if entity.is_empty() || !haystack.contains(entity) {
                continue;
            }
            if let Ok(Some(entry)) = self.get_raw(signature) {
                hits.push(entry);
                if hits.len() >= 2 {
                    break;
                }
            }
        }
        hits
    }

    /// Decisions ordered by most recent update, optionally filtered by
    /// verdict.
    pub fn list_decisions(
        &self,
        verdict: Option<Verdict>,
        limit: usize,
    ) -> Result<Vec<DecisionEntry>, ElaraError> {
        let mut entries = Vec::new();
        for item in self.decisions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let entry: DecisionEntry = bincode::deserialize(&bytes)
                .map_err(|e| ElaraError::Serialization(e.to_string()))?;
            if verdict.is_none() || verdict == Some(entry.verdict) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.updated.cmp(&a.updated));
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn stats(&self) -> Result<RegistryStats, ElaraError> {
        let mut stats = RegistryStats {
            total: 0,
            rejected: 0,
            failed: 0,
            approved: 0,
            revisit: 0,
            blocked_entities: self.blocked.read().expect("blocked set lock poisoned").len(),
        };
        for item in self.decisions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let entry: DecisionEntry = bincode::deserialize(&bytes)
                .map_err(|e| ElaraError::Serialization(e.to_string()))?;
            stats.total += 1;
            match entry.verdict {
                Verdict::Rejected => stats.rejected += 1,
                Verdict::Failed => stats.failed += 1,
                Verdict::Approved => stats.approved += 1,
                Verdict::Revisit => stats.revisit += 1,
            }
        }
        Ok(stats)
    }

    // ── Fail-silent feeds ────────────────────────────────────────────────────

    /// Scan a corrections file (JSON list) for entries carrying a domain and
    /// entity; each becomes an auto-derived `rejected` decision. Failures
    /// never break the corrections subsystem — any problem reads as zero.
    pub fn backfill_from_corrections(&self, path: &Path) -> usize {
        self.backfill(path, Source::Corrections, |item| {
            let domain = item.get("domain")?.as_str()?;
            let entity = item.get("entity")?.as_str()?;
            let reason = item
                .get("correction")
                .or_else(|| item.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("backfilled from corrections");
            Some((domain.to_string(), entity.to_string(), Verdict::Rejected, reason.to_string()))
        })
    }

    /// Scan an outcomes file (JSON list); unsuccessful outcomes become
    /// auto-derived `failed` decisions.
    pub fn backfill_from_outcomes(&self, path: &Path) -> usize {
        self.backfill(path, Source::Outcomes, |item| {
            if item.get("success").and_then(Value::as_bool) != Some(false) {
                return None;
            }
            let domain = item.get("domain")?.as_str()?;
            let entity = item.get("entity")?.as_str()?;
            let reason = item
                .get("outcome")
                .or_else(|| item.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("backfilled from outcomes");
            Some((domain.to_string(), entity.to_string(), Verdict::Failed, reason.to_string()))
        })
    }

    fn backfill<F>(&self, path: &Path, source: Source, extract: F) -> usize
    where
        F: Fn(&Value) -> Option<(String, String, Verdict, String)>,
    {
        let Ok(text) = std::fs::read_to_string(path) else {
            return 0;
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text) else {
            return 0;
        };

        let mut added = 0;
        for item in &items {
            let Some((domain, entity, verdict, reason)) = extract(item) else {
                continue;
            };
            if self
                .record_decision(&domain, &entity, verdict, 0.6, &reason, source, None, vec![])
                .is_ok()
            {
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_registry(name: &str) -> DecisionRegistry {
        let dir = std::env::temp_dir().join(format!("elara_udr_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        DecisionRegistry::open(&dir).unwrap()
    }

    #[test]
    fn record_and_check_round_trip() {
        let registry = temp_registry("round_trip");
        registry
            .record_decision(
                "publish",
                "ArXiv",
                Verdict::Rejected,
                0.8,
                "tried five times",
                Source::Manual,
                Some(110),
                vec!["research".into()],
            )
            .unwrap();

        let entry = registry.check_decision("Publish", "arxiv ").unwrap().unwrap();
        assert_eq!(entry.action_signature, "publish:arxiv");
        assert_eq!(entry.verdict, Verdict::Rejected);
        assert_eq!(entry.confidence, 0.8);
        assert_eq!(entry.session, Some(110));
    }

    #[test]
    fn re_recording_bumps_confidence_capped() {
        let registry = temp_registry("bump");
        for _ in 0..5 {
            registry
                .record_decision(
                    "publish", "arxiv", Verdict::Rejected, 0.8, "again", Source::Manual, None,
                    vec![],
                )
                .unwrap();
        }
        let entry = registry.check_decision("publish", "arxiv").unwrap().unwrap();
        assert!((entry.confidence - 1.0).abs() < 1e-9);
        assert_eq!(registry.stats().unwrap().total, 1);
    }

    #[test]
    fn check_entities_scans_blocked_set_max_two() {
        let registry = temp_registry("entities");
        registry
            .record_decision("publish", "arxiv", Verdict::Rejected, 0.9, "", Source::Manual, None, vec![])
            .unwrap();
        registry
            .record_decision("outreach", "esa", Verdict::Failed, 0.9, "", Source::Manual, None, vec![])
            .unwrap();
        registry
            .record_decision("outreach", "techrxiv", Verdict::Failed, 0.9, "", Source::Manual, None, vec![])
            .unwrap();
        registry
            .record_decision("tooling", "rust", Verdict::Approved, 0.9, "", Source::Manual, None, vec![])
            .unwrap();

        let hits = registry.check_entities("Maybe submit to arXiv or contact ESA about TechRxiv?");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.verdict != Verdict::Approved));

        assert!(registry.check_entities("nothing known here").is_empty());
        // Approved entities never hit.
        assert!(registry.check_entities("rust").is_empty());
    }

    #[test]
    fn approval_unblocks_a_signature() {
        let registry = temp_registry("unblock");
        registry
            .record_decision("publish", "arxiv", Verdict::Rejected, 0.5, "", Source::Manual, None, vec![])
            .unwrap();
        assert_eq!(registry.check_entities("arxiv").len(), 1);

        registry
            .record_decision("publish", "arxiv", Verdict::Revisit, 0.5, "worth another look", Source::Manual, None, vec![])
            .unwrap();
        assert!(registry.check_entities("arxiv").is_empty());
    }

    #[test]
    fn blocked_set_rebuilds_on_boot() {
        let dir = std::env::temp_dir().join(format!("elara_udr_boot_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        {
            let registry = DecisionRegistry::open(&dir).unwrap();
            registry
                .record_decision("a", "x", Verdict::Rejected, 0.5, "", Source::Manual, None, vec![])
                .unwrap();
            registry
                .record_decision("b", "y", Verdict::Approved, 0.5, "", Source::Manual, None, vec![])
                .unwrap();
        }
        let reopened = DecisionRegistry::open(&dir).unwrap();
        assert_eq!(reopened.stats().unwrap().blocked_entities, 1);
    }

    #[test]
    fn list_filters_by_verdict() {
        let registry = temp_registry("list");
        registry
            .record_decision("a", "x", Verdict::Rejected, 0.5, "", Source::Manual, None, vec![])
            .unwrap();
        registry
            .record_decision("b", "y", Verdict::Approved, 0.5, "", Source::Manual, None, vec![])
            .unwrap();

        assert_eq!(registry.list_decisions(None, 10).unwrap().len(), 2);
        let rejected = registry.list_decisions(Some(Verdict::Rejected), 10).unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].action_signature, "a:x");
    }

    #[test]
    fn backfill_is_fail_silent() {
        let registry = temp_registry("backfill");
        let dir = std::env::temp_dir().join(format!("elara_udr_feeds_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let corrections = dir.join("corrections.json");
        std::fs::write(
            &corrections,
            json!([
                {"domain": "publish", "entity": "arxiv", "correction": "stop suggesting arxiv"},
                {"unrelated": true}
            ])
            .to_string(),
        )
        .unwrap();
        assert_eq!(registry.backfill_from_corrections(&corrections), 1);

        let outcomes = dir.join("outcomes.json");
        std::fs::write(
            &outcomes,
            json!([
                {"domain": "outreach", "entity": "esa", "success": false, "outcome": "no reply"},
                {"domain": "outreach", "entity": "nasa", "success": true}
            ])
            .to_string(),
        )
        .unwrap();
        assert_eq!(registry.backfill_from_outcomes(&outcomes), 1);

        // Missing and malformed files read as zero.
        assert_eq!(registry.backfill_from_corrections(&dir.join("absent.json")), 0);
        std::fs::write(dir.join("bad.json"), "not json").unwrap();
        assert_eq!(registry.backfill_from_corrections(&dir.join("bad.json")), 0);

        assert_eq!(registry.stats().unwrap().blocked_entities, 2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
