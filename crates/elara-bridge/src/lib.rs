//! elara-bridge — translates cognitive events into signed validation records
//! (Layer 1 bridge) and snapshots the whole cognitive state into a verifiable
//! chain of checkpoints (continuity chain).

pub mod bridge;
pub mod continuity;
pub mod digest;

pub use bridge::Layer1Bridge;
pub use continuity::ContinuityChain;
pub use digest::{CognitiveDigest, CognitiveStateProvider, FileStateProvider};

/// Continuity subscriptions outrank the bridge's so a checkpoint always
/// captures the state current at trigger time, before the bridge advances
/// its head.
pub const CONTINUITY_PRIORITY: i32 = 50;
pub const BRIDGE_PRIORITY: i32 = 40;
