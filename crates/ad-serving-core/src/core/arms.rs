// crates/ad-serving-core/src/core/arms.rs
// ============================================================================
// Module: Ad Serving Bandit Arms
// Description: Persistent per-segment counters for the epsilon-greedy bandit.
// Purpose: Model arm statistics independent of the storage backend.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! A [`BanditArm`] holds the pull count and reward sum for one segment.
//! Counters only grow; clearing happens through explicit store resets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Segment;

// ============================================================================
// SECTION: Bandit Arm
// ============================================================================

/// Reward assumed for arms that have never been pulled.
pub const OPTIMISTIC_INITIAL_REWARD: f64 = 1.0;

/// Counters for a single bandit arm.
///
/// # Invariants
/// - `pulls` never decreases outside explicit resets.
/// - `reward_sum` is within `[0, pulls]` when rewards are in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditArm {
    /// Segment the arm represents.
    pub segment: Segment,
    /// Number of rewards recorded.
    pub pulls: u64,
    /// Sum of recorded rewards.
    pub reward_sum: f64,
}

impl BanditArm {
    /// Creates an arm with no pulls.
    #[must_use]
    pub const fn new(segment: Segment) -> Self {
        Self {
            segment,
            pulls: 0,
            reward_sum: 0.0,
        }
    }

    /// Returns the mean reward, or the optimistic initial reward when unpulled.
    #[must_use]
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            return OPTIMISTIC_INITIAL_REWARD;
        }
        #[allow(clippy::cast_precision_loss, reason = "Pull counts stay far below 2^52.")]
        let pulls = self.pulls as f64;
        self.reward_sum / pulls
    }
}
