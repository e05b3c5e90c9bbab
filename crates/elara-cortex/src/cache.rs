//! Reflex cache — TTL-based in-memory cache with event-driven invalidation.
//! Zero-I/O for the hot reads: mood, presence stats, imprints, context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::events::{EventBus, EventType};

/// Standard cache keys. The key set and TTLs are fixed at build time.
pub mod keys {
    pub const MOOD_STATE: &str = "mood_state";
    pub const IMPRINTS: &str = "imprints";
    pub const PRESENCE_STATS: &str = "presence_stats";
    pub const MEMORY_COUNT: &str = "memory_count";
    pub const CONTEXT_DATA: &str = "context_data";
    pub const GOAL_LIST: &str = "goal_list";
    pub const CORRECTION_INDEX: &str = "correction_index";
    pub const LLM_AVAILABILITY: &str = "llm_availability";
    pub const DREAM_STATUS: &str = "dream_status";
}

/// TTL in seconds for a well-known key; 30 s for anything else.
pub fn ttl_for(key: &str) -> f64 {
    match key {
        keys::MOOD_STATE => 5.0,
        keys::IMPRINTS => 10.0,
        keys::PRESENCE_STATS => 30.0,
        keys::MEMORY_COUNT => 60.0,
        keys::CONTEXT_DATA => 30.0,
        keys::GOAL_LIST => 120.0,
        keys::CORRECTION_INDEX => 120.0,
        keys::LLM_AVAILABILITY => 60.0,
        keys::DREAM_STATUS => 300.0,
        _ => 30.0,
    }
}

/// Which cache keys each event invalidates.
fn invalidation_map() -> Vec<(EventType, &'static [&'static str])> {
    use keys::*;
    vec![
        (EventType::MoodChanged, &[MOOD_STATE]),
        (EventType::MoodSet, &[MOOD_STATE]),
        (EventType::ImprintCreated, &[IMPRINTS, MOOD_STATE]),
        (EventType::ImprintDecayed, &[IMPRINTS]),
        (EventType::SessionStarted, &[PRESENCE_STATS]),
        (EventType::SessionEnded, &[PRESENCE_STATS]),
        (EventType::MemorySaved, &[MEMORY_COUNT]),
        (EventType::MemoryConsolidated, &[MEMORY_COUNT]),
        (EventType::GoalAdded, &[GOAL_LIST]),
        (EventType::GoalUpdated, &[GOAL_LIST]),
        (EventType::CorrectionAdded, &[CORRECTION_INDEX]),
        (EventType::LlmUnavailable, &[LLM_AVAILABILITY]),
        (EventType::DreamCompleted, &[DREAM_STATUS]),
    ]
}

#[derive(Clone, Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub invalidations: u64,
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

struct Inner {
    store: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

/// Thread-safe TTL map. Expiry is checked on read — no background reaper.
pub struct CorticalCache {
    inner: Mutex<Inner>,
}

impl Default for CorticalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CorticalCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: HashMap::new(),
                hits: 0,
                misses: 0,
                invalidations: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("cache lock poisoned")
    }

    /// Get a cached value. `None` on miss or expiry.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.lock();
        match inner.store.get(key) {
            Some(entry) if Instant::now() <= entry.expires_at => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.store.remove(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a value with a TTL in seconds.
    pub fn set(&self, key: &str, value: Value, ttl_seconds: f64) {
        let mut inner = self.lock();
        inner.store.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + Duration::from_secs_f64(ttl_seconds.max(0.0)),
            },
        );
    }

    /// Remove one or more keys. Returns how many were actually present.
    pub fn invalidate(&self, keys: &[&str]) -> usize {
        let mut inner = self.lock();
        let mut removed = 0;
        for key in keys {
            if inner.store.remove(*key).is_some() {
                removed += 1;
            }
        }
        inner.invalidations += removed as u64;
        if removed > 0 {
            tracing::debug!(?keys, removed, "cache invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().store.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            entries: inner.store.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total > 0 {
                inner.hits as f64 / total as f64
            } else {
                0.0
            },
            invalidations: inner.invalidations,
        }
    }

    /// Get from cache, or compute + cache on miss. The computation runs
    /// outside the lock so it cannot block other cache operations.
    pub fn get_or_compute<F>(&self, key: &str, ttl_seconds: f64, compute: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone(), ttl_seconds);
        value
    }
}

/// Subscribe the cache to the fixed event→key invalidation table. Handlers
/// hold a weak reference, so the cache can be dropped independently of the
/// bus.
pub fn setup_cache_invalidation(cache: &Arc<CorticalCache>, bus: &EventBus) {
    let mut wired = 0;
    for (event_type, keys) in invalidation_map() {
        let cache: Weak<CorticalCache> = Arc::downgrade(cache);
        bus.on(
            event_type,
            move |_event| {
                if let Some(cache) = cache.upgrade() {
                    cache.invalidate(keys);
                }
            },
            100,
            Some("cache"),
        );
        wired += 1;
    }
    tracing::info!(events = wired, "cache invalidation wired");
}
