// crates/ad-serving-core/src/runtime/bandit.rs
// ============================================================================
// Module: Ad Serving Epsilon-Greedy Bandit
// Description: Segment arm selection and reward updates.
// Purpose: Balance exploiting the best-known segment against exploring others.
// Dependencies: crate::{core, interfaces, runtime::pacing}, thiserror
// ============================================================================

//! ## Overview
//! [`EpsilonGreedyBandit`] selects a segment among the eligible set. With
//! probability epsilon it explores uniformly; otherwise it exploits the arm
//! with the highest mean reward. Unpulled arms score
//! [`OPTIMISTIC_INITIAL_REWARD`] so every segment is tried early.
//!
//! Ties on mean reward go to the arm with the fewest pulls; any remaining tie
//! is resolved by the shared pacing draw, so selection is fully determined by
//! the arm counters and the random handle.
//!
//! # Invariants
//! - [`EpsilonGreedyBandit::update_reward`] adds exactly one pull and exactly
//!   `reward` to one arm and touches no other arm.
//! - Arm counters are only cleared by [`EpsilonGreedyBandit::reset`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::BanditArm;
use crate::core::OPTIMISTIC_INITIAL_REWARD;
use crate::core::Segment;
use crate::interfaces::ArmStoreError;
use crate::interfaces::BanditArmStore;
use crate::runtime::pacing::PacingRandom;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bandit errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BanditError {
    /// Arm store failed.
    #[error(transparent)]
    Store(#[from] ArmStoreError),
    /// Reward is not finite or outside `[0, 1]`.
    #[error("reward {0} is outside [0, 1]")]
    InvalidReward(f64),
    /// Epsilon is not finite or outside `[0, 1]`.
    #[error("epsilon {0} is outside [0, 1]")]
    InvalidEpsilon(f64),
    /// Arm pull count would overflow.
    #[error("pull count overflow for segment {0}")]
    PullOverflow(Segment),
}

// ============================================================================
// SECTION: Bandit
// ============================================================================

/// Epsilon-greedy segment selector backed by an arm store.
#[derive(Debug, Clone)]
pub struct EpsilonGreedyBandit<S> {
    /// Arm persistence.
    store: S,
}

impl<S> EpsilonGreedyBandit<S>
where
    S: BanditArmStore,
{
    /// Creates a bandit over `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the arm store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Selects a segment from `segments`, or `None` when the set is empty.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError`] when epsilon is invalid or arms cannot be loaded.
    pub fn select_arm(
        &self,
        segments: &BTreeSet<Segment>,
        epsilon: f64,
        random: &PacingRandom,
    ) -> Result<Option<Segment>, BanditError> {
        if !epsilon.is_finite() || !(0.0..=1.0).contains(&epsilon) {
            return Err(BanditError::InvalidEpsilon(epsilon));
        }
        if segments.is_empty() {
            return Ok(None);
        }
        let ordered: Vec<&Segment> = segments.iter().collect();
        if random.generate_random_number() < epsilon {
            let index = pick_index(random.generate_random_number(), ordered.len());
            return Ok(ordered.get(index).map(|segment| (*segment).clone()));
        }

        let arms = self.store.load_arms()?;
        let mut best_mean = f64::NEG_INFINITY;
        let mut best_pulls = u64::MAX;
        let mut tied: Vec<&Segment> = Vec::new();
        for segment in ordered {
            let (mean, pulls) = arms
                .get(segment)
                .map_or((OPTIMISTIC_INITIAL_REWARD, 0), |arm| (arm.mean_reward(), arm.pulls));
            if mean > best_mean || (mean == best_mean && pulls < best_pulls) {
                best_mean = mean;
                best_pulls = pulls;
                tied.clear();
                tied.push(segment);
            } else if mean == best_mean && pulls == best_pulls {
                tied.push(segment);
            }
        }
        if tied.len() == 1 {
            return Ok(tied.first().map(|segment| (*segment).clone()));
        }
        let index = pick_index(random.generate_random_number(), tied.len());
        Ok(tied.get(index).map(|segment| (*segment).clone()))
    }

    /// Records `reward` for `segment`.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError`] when the reward is invalid or the store fails.
    pub fn update_reward(&self, segment: &Segment, reward: f64) -> Result<BanditArm, BanditError> {
        if !reward.is_finite() || !(0.0..=1.0).contains(&reward) {
            return Err(BanditError::InvalidReward(reward));
        }
        let mut arm = self
            .store
            .load_arms()?
            .remove(segment)
            .unwrap_or_else(|| BanditArm::new(segment.clone()));
        arm.pulls =
            arm.pulls.checked_add(1).ok_or_else(|| BanditError::PullOverflow(segment.clone()))?;
        arm.reward_sum += reward;
        self.store.save_arm(&arm)?;
        Ok(arm)
    }

    /// Returns every stored arm.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError`] when arms cannot be loaded.
    pub fn arms(&self) -> Result<BTreeMap<Segment, BanditArm>, BanditError> {
        Ok(self.store.load_arms()?)
    }

    /// Clears every arm (explicit data clearing).
    ///
    /// # Errors
    ///
    /// Returns [`BanditError`] when the store cannot be cleared.
    pub fn reset(&self) -> Result<(), BanditError> {
        Ok(self.store.clear()?)
    }
}

/// Maps a draw in `[0, 1)` onto an index below `len`.
fn pick_index(draw: f64, len: usize) -> usize {
    let Ok(len_u32) = u32::try_from(len) else {
        return 0;
    };
    if len_u32 == 0 {
        return 0;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The scaled draw is clamped to [0, len] before conversion."
    )]
    let index = (draw.clamp(0.0, 1.0) * f64::from(len_u32)).floor() as u32;
    usize::try_from(index.min(len_u32 - 1)).unwrap_or(0)
}
