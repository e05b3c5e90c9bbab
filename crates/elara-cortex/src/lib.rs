//! elara-cortex — the cortical execution substrate: reflex cache (layer 0),
//! reactive event bus (layer 1), and deliberative worker pools (layer 2).

pub mod cache;
pub mod events;
pub mod payload;
pub mod services;
pub mod workers;

pub use cache::CorticalCache;
pub use events::{Event, EventBus, EventType};
pub use payload::{ArtifactInfo, Payload};
pub use services::Services;
pub use workers::{WorkerManager, WorkerPool};
