//! elara-core — record model, identifiers, errors, and configuration for the
//! Elara cognitive substrate.

pub mod config;
pub mod constants;
pub mod error;
pub mod record;
pub mod types;

pub use error::ElaraError;
pub use record::ValidationRecord;
