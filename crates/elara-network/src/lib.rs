//! elara-network — HTTP record exchange, witness attestation, and trust
//! scoring between nodes running the same protocol. Exchange is pull-based;
//! there is no gossip and no consensus.

pub mod client;
pub mod server;
pub mod trust;
pub mod types;
pub mod witness;

pub use client::NetworkClient;
pub use server::NetworkServer;
pub use trust::TrustScore;
pub use witness::{WitnessAttestation, WitnessManager};
