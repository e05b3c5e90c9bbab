//! elara-udr — unified decision registry: crystallized judgments that prevent
//! repetition of rejected actions.

pub mod registry;

pub use registry::{DecisionEntry, DecisionRegistry, Source, Verdict};
