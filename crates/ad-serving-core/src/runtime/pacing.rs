// crates/ad-serving-core/src/runtime/pacing.rs
// ============================================================================
// Module: Ad Serving Pacing
// Description: Injected random source with a scoped override and pacing helpers.
// Purpose: Smooth serve rates probabilistically while keeping tests deterministic.
// Dependencies: rand, thiserror
// ============================================================================

//! ## Overview
//! [`PacingRandom`] is the single random handle shared by pacing and the
//! bandit. It wraps an injected [`RandomSource`] and holds at most one
//! override installed through [`PacingRandom::override_for_testing`]. The
//! override lasts as long as the returned [`ScopedRandomOverride`]; dropping
//! it restores the underlying source.
//!
//! Pass-level pacing admits an opportunity when a draw is strictly below the
//! configured threshold. Per-candidate pacing drops a candidate when a fresh
//! draw exceeds its pass-through rate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::core::Candidate;

// ============================================================================
// SECTION: Random Sources
// ============================================================================

/// Source of uniformly distributed numbers in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    /// Returns the next draw.
    fn next_unit(&self) -> f64;
}

/// Thread-local random source for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomSource;

impl RandomSource for ThreadRandomSource {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Seeded random source producing a reproducible sequence.
#[derive(Debug)]
pub struct SeededRandomSource {
    /// Seeded generator.
    rng: Mutex<StdRng>,
}

impl SeededRandomSource {
    /// Creates a source seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandomSource {
    fn next_unit(&self) -> f64 {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen_range(0.0..1.0)
    }
}

/// Source that always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandomSource(pub f64);

impl RandomSource for FixedRandomSource {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

// ============================================================================
// SECTION: Shared Handle
// ============================================================================

/// Pacing random handle errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq)]
pub enum PacingError {
    /// Another override is still active.
    #[error("a pacing random override is already active")]
    OverrideActive,
    /// Override value is outside `[0, 1)`.
    #[error("pacing random override {0} is outside [0, 1)")]
    OutOfRange(f64),
}

/// Shared random handle used by pacing and arm selection.
///
/// # Invariants
/// - Clones share both the source and the override slot.
/// - At most one override is active at a time.
#[derive(Clone)]
pub struct PacingRandom {
    /// Underlying random source.
    source: Arc<dyn RandomSource>,
    /// Active override, if any.
    override_value: Arc<Mutex<Option<f64>>>,
}

impl fmt::Debug for PacingRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacingRandom").field("override_value", &self.current_override()).finish()
    }
}

impl Default for PacingRandom {
    fn default() -> Self {
        Self::new(Arc::new(ThreadRandomSource))
    }
}

impl PacingRandom {
    /// Creates a handle over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn RandomSource>) -> Self {
        Self {
            source,
            override_value: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a handle over a seeded source.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(Arc::new(SeededRandomSource::new(seed)))
    }

    /// Returns the override value or a fresh draw in `[0, 1)`.
    #[must_use]
    pub fn generate_random_number(&self) -> f64 {
        self.current_override().unwrap_or_else(|| self.source.next_unit())
    }

    /// Installs `value` as the override until the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PacingError::OverrideActive`] when an override is already installed
    /// and [`PacingError::OutOfRange`] when `value` is outside `[0, 1)`.
    pub fn override_for_testing(&self, value: f64) -> Result<ScopedRandomOverride, PacingError> {
        if !(0.0..1.0).contains(&value) {
            return Err(PacingError::OutOfRange(value));
        }
        let mut slot = self.override_value.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(PacingError::OverrideActive);
        }
        *slot = Some(value);
        drop(slot);
        Ok(ScopedRandomOverride {
            slot: Arc::clone(&self.override_value),
        })
    }

    /// Returns the active override value, if any.
    #[must_use]
    pub fn current_override(&self) -> Option<f64> {
        *self.override_value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped override handle; dropping it clears the override.
#[derive(Debug)]
#[must_use = "the override is cleared as soon as the handle is dropped"]
pub struct ScopedRandomOverride {
    /// Override slot shared with the issuing handle.
    slot: Arc<Mutex<Option<f64>>>,
}

impl Drop for ScopedRandomOverride {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

// ============================================================================
// SECTION: Pacing
// ============================================================================

/// Pass-level pacing outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassAdmission {
    /// Draw used for the decision.
    pub draw: f64,
    /// Threshold in effect.
    pub threshold: f64,
    /// True when the pass is admitted.
    pub admitted: bool,
}

/// Decides whether a serving pass is admitted (`draw < threshold`).
#[must_use]
pub fn admit_pass(random: &PacingRandom, threshold: f64) -> PassAdmission {
    let draw = random.generate_random_number();
    PassAdmission {
        draw,
        threshold,
        admitted: draw < threshold,
    }
}

/// Drops candidates whose pass-through rate is below a fresh draw.
#[must_use]
pub fn pace_candidates(random: &PacingRandom, candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| random.generate_random_number() <= candidate.pass_through_rate)
        .collect()
}
