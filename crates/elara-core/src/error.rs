use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElaraError {
    // ── Crypto errors ────────────────────────────────────────────────────────
    #[error("crypto backend missing: {0}")]
    CryptoBackendMissing(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key length: expected {expected}, got {got}")]
    InvalidPublicKeyLength { expected: usize, got: usize },

    #[error("identity I/O error: {0}")]
    IdentityIo(String),

    // ── Record / wire errors ─────────────────────────────────────────────────
    #[error("record wire format error: {0}")]
    RecordWire(String),

    #[error("unsupported wire version: {0}")]
    WireVersion(u8),

    // ── Storage errors ───────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Execution substrate ──────────────────────────────────────────────────
    #[error("worker pool '{pool}' full ({pending}/{limit})")]
    WorkerPoolBusy {
        pool: String,
        pending: usize,
        limit: usize,
    },

    // ── Network ──────────────────────────────────────────────────────────────
    #[error("network transport error: {0}")]
    Transport(String),

    #[error("peer rejected request: {status} {reason}")]
    PeerRejected { status: u16, reason: String },

    // ── General ──────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}
