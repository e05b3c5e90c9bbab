//! ─── Elara Protocol Constants ───────────────────────────────────────────────
//!
//! Every cognitive artifact gets a cryptographic proof — what was thought,
//! when, signed by whom. These are the substrate's fixed numbers.

// ── Wire format ──────────────────────────────────────────────────────────────

/// Version prefix of the record wire serialization.
pub const WIRE_VERSION: u8 = 1;

// ── Layer 1 bridge ───────────────────────────────────────────────────────────

/// Default sliding-window rate limit for validated events (per minute).
/// Overridable via `ELARA_BRIDGE_RATE_LIMIT`.
pub const DEFAULT_BRIDGE_RATE_LIMIT: usize = 120;

/// Dedup set capacity; cleared wholesale when reached.
pub const DEDUP_MAX_ENTRIES: usize = 10_000;

/// Max chars of the content summary stored in record metadata.
pub const SUMMARY_MAX_CHARS: usize = 200;

// ── Continuity chain ─────────────────────────────────────────────────────────

/// Minimum monotonic seconds between accepted checkpoints.
pub const CHECKPOINT_COOLDOWN_SECS: f64 = 300.0;

/// Mood-change trigger threshold: |delta| must exceed this to checkpoint.
pub const MOOD_DELTA_THRESHOLD: f64 = 0.3;

// ── Event bus ────────────────────────────────────────────────────────────────

/// Recursion safety — max emit depth per thread before refusing.
pub const MAX_EMIT_DEPTH: usize = 3;

/// Default bounded length of the event history deque.
pub const DEFAULT_HISTORY_SIZE: usize = 128;

// ── Worker pools ─────────────────────────────────────────────────────────────

/// Hard ceiling on pending work per pool; submissions beyond it are refused.
pub const MAX_QUEUE_DEPTH: usize = 32;

pub const IO_POOL_THREADS: usize = 4;
pub const LLM_POOL_THREADS: usize = 2;

// ── Network ──────────────────────────────────────────────────────────────────

/// Default HTTP port for record exchange. Overridable via `ELARA_NETWORK_PORT`.
pub const DEFAULT_NETWORK_PORT: u16 = 9473;

/// Cap on records returned by `GET /records`.
pub const MAX_RECORDS_PER_QUERY: usize = 100;

/// Default HTTP client timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// ── Trust ────────────────────────────────────────────────────────────────────

/// Level thresholds over the witness trust score.
pub const TRUST_LEVEL_LOW: f64 = 0.25;
pub const TRUST_LEVEL_MODERATE: f64 = 0.60;
pub const TRUST_LEVEL_HIGH: f64 = 0.85;
