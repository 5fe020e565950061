// crates/ad-serving-core/src/core/params.rs
// ============================================================================
// Module: Ad Serving Parameters
// Description: Runtime-tunable serving parameters and their shared handle.
// Purpose: Let configuration changes take effect on the next opportunity.
// Dependencies: crate::core::{ad, identifiers}, serde
// ============================================================================

//! ## Overview
//! [`ServingParams`] groups the feature-flag style knobs for every stage.
//! Stages read a fresh snapshot through [`ParamsHandle`] when they run, so a
//! replacement is visible to the next stage without restarting anything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ad::AdType;
use crate::core::identifiers::CreativeSetId;

// ============================================================================
// SECTION: Permission Parameters
// ============================================================================

/// Local quiet-hours window for the do-not-disturb rule.
///
/// # Invariants
/// - Hours are in `0..24`; `start_hour > end_hour` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    /// First quiet hour (inclusive).
    pub start_hour: u8,
    /// Hour at which serving resumes (exclusive).
    pub end_hour: u8,
}

impl QuietHours {
    /// Returns true when `hour` falls inside the window.
    #[must_use]
    pub const fn contains(self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Permission rule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionParams {
    /// Names of disabled permission rules.
    pub disabled: BTreeSet<String>,
    /// Maximum notification ads served per rolling hour. Zero serves none.
    pub ads_per_hour: u32,
    /// Maximum notification ads served per rolling day. Zero serves none.
    pub ads_per_day: u32,
    /// Minimum seconds between served notification ads.
    pub minimum_wait_time_secs: u64,
    /// Optional quiet hours.
    pub quiet_hours: Option<QuietHours>,
}

impl Default for PermissionParams {
    fn default() -> Self {
        Self {
            disabled: BTreeSet::new(),
            ads_per_hour: 10,
            ads_per_day: 100,
            minimum_wait_time_secs: 300,
            quiet_hours: None,
        }
    }
}

// ============================================================================
// SECTION: Exclusion Parameters
// ============================================================================

/// Exclusion rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionParams {
    /// Names of disabled exclusion rules.
    pub disabled: BTreeSet<String>,
    /// Rolling window for counting dismissals, in seconds.
    pub dismissed_window_secs: u64,
    /// Dismissals within the window that exclude a creative set.
    pub dismissed_cap: u32,
    /// Minimum cosine similarity between page and candidate embeddings.
    pub min_embedding_similarity: Option<f64>,
    /// Sites that anti-target each creative set.
    pub anti_targeting: BTreeMap<CreativeSetId, BTreeSet<String>>,
}

impl Default for ExclusionParams {
    fn default() -> Self {
        Self {
            disabled: BTreeSet::new(),
            dismissed_window_secs: 172_800,
            dismissed_cap: 2,
            min_embedding_similarity: None,
            anti_targeting: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Pacing, Bandit, and Event Parameters
// ============================================================================

/// Pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingParams {
    /// Pass-level admission threshold; a draw below it admits the pass.
    pub threshold: f64,
}

impl Default for PacingParams {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

/// Bandit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanditParams {
    /// Exploration probability.
    pub epsilon: f64,
}

impl Default for BanditParams {
    fn default() -> Self {
        Self { epsilon: 0.05 }
    }
}

/// Event handler parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventParams {
    /// Ad types whose ads may be clicked without a prior view.
    pub click_from_served_ad_types: BTreeSet<AdType>,
}

impl EventParams {
    /// Returns true when `ad_type` allows `Clicked` directly from `Served`.
    #[must_use]
    pub fn allows_click_from_served(&self, ad_type: AdType) -> bool {
        self.click_from_served_ad_types.contains(&ad_type)
    }
}

// ============================================================================
// SECTION: Redemption Parameters
// ============================================================================

/// Confirmation redemption parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedemptionParams {
    /// Base URL of the anonymous confirmation host.
    pub anonymous_host: String,
    /// Base URL of the anonymous search confirmation host.
    pub anonymous_search_host: String,
    /// Initial retry backoff in seconds.
    pub base_backoff_secs: u64,
    /// Maximum retry backoff in seconds.
    pub max_backoff_secs: u64,
    /// Attempts before a retryable failure is abandoned.
    pub max_attempts: u32,
}

impl Default for RedemptionParams {
    fn default() -> Self {
        Self {
            anonymous_host: "https://anonymous.ads.invalid".to_string(),
            anonymous_search_host: "https://search.anonymous.ads.invalid".to_string(),
            base_backoff_secs: 60,
            max_backoff_secs: 3_600,
            max_attempts: 5,
        }
    }
}

// ============================================================================
// SECTION: Serving Parameters
// ============================================================================

/// All serving parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingParams {
    /// Permission rule parameters.
    pub permission: PermissionParams,
    /// Exclusion rule parameters.
    pub exclusion: ExclusionParams,
    /// Pacing parameters.
    pub pacing: PacingParams,
    /// Bandit parameters.
    pub bandit: BanditParams,
    /// Event handler parameters.
    pub events: EventParams,
    /// Redemption parameters.
    pub redemption: RedemptionParams,
}

/// Shared handle to the serving parameters.
///
/// # Invariants
/// - Clones observe the same parameters.
/// - Snapshots are owned; replacements never affect a snapshot already taken.
#[derive(Debug, Clone, Default)]
pub struct ParamsHandle {
    /// Shared parameters.
    params: Arc<RwLock<ServingParams>>,
}

impl ParamsHandle {
    /// Creates a handle holding `params`.
    #[must_use]
    pub fn new(params: ServingParams) -> Self {
        Self {
            params: Arc::new(RwLock::new(params)),
        }
    }

    /// Returns a snapshot of the current parameters.
    #[must_use]
    pub fn snapshot(&self) -> ServingParams {
        self.params.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces all parameters.
    pub fn replace(&self, params: ServingParams) {
        *self.params.write().unwrap_or_else(PoisonError::into_inner) = params;
    }

    /// Applies `change` to the parameters.
    pub fn update(&self, change: impl FnOnce(&mut ServingParams)) {
        let mut guard = self.params.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut guard);
    }
}
