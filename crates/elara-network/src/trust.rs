//! Trust scoring — a monotone function of accumulated witness count. There
//! is no agreement protocol; confidence comes only from how many distinct
//! peers have counter-signed a record.

use elara_core::constants::{TRUST_LEVEL_HIGH, TRUST_LEVEL_LOW, TRUST_LEVEL_MODERATE};

pub struct TrustScore;

impl TrustScore {
    /// `n / (n + 1)`: zero witnesses score 0.0, one scores 0.5, and the
    /// curve climbs toward (but never reaches) 1.0.
    pub fn compute(witness_count: u64) -> f64 {
        witness_count as f64 / (witness_count as f64 + 1.0)
    }

    /// Bucket a score into a named level.
    pub fn level(score: f64) -> &'static str {
        if score <= 0.0 {
            "none"
        } else if score < TRUST_LEVEL_LOW {
            "low"
        } else if score < TRUST_LEVEL_MODERATE {
            "moderate"
        } else if score < TRUST_LEVEL_HIGH {
            "high"
        } else {
            "very-high"
        }
    }
}
