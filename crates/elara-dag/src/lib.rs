//! elara-dag — the per-node store of validation records and parent edges.

pub mod store;

pub use store::{DagStats, LocalDAG};
