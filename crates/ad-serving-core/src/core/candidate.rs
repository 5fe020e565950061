// crates/ad-serving-core/src/core/candidate.rs
// ============================================================================
// Module: Ad Serving Candidates
// Description: Catalog-provided descriptions of servable ads.
// Purpose: Define the immutable candidate model consumed by the pipeline.
// Dependencies: crate::core::{ad, identifiers}, serde
// ============================================================================

//! ## Overview
//! Candidates are owned by the catalog collaborator and are read-only to the
//! serving pipeline. Every field that an exclusion rule or the selector reads
//! lives here, so evaluating a candidate never requires another lookup besides
//! the event history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ad::AdType;
use crate::core::identifiers::CampaignId;
use crate::core::identifiers::CreativeInstanceId;
use crate::core::identifiers::CreativeSetId;
use crate::core::identifiers::Segment;

// ============================================================================
// SECTION: Frequency Caps
// ============================================================================

/// Frequency caps applied to a candidate over rolling windows.
///
/// # Invariants
/// - A cap of zero means the cap is not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyCaps {
    /// Maximum serves of the creative instance within one hour.
    pub per_hour: u32,
    /// Maximum serves of the creative set within one day.
    pub per_day: u32,
    /// Maximum serves of the creative set within one week.
    pub per_week: u32,
    /// Maximum serves of the creative set over all time.
    pub total_max: u32,
    /// Maximum serves of the campaign within one day.
    pub daily_cap: u32,
}

// ============================================================================
// SECTION: Dayparts
// ============================================================================

/// Local time-of-week window in which a candidate may be served.
///
/// # Invariants
/// - `days_of_week` uses 0 for Sunday through 6 for Saturday.
/// - `start_minute` and `end_minute` are inclusive minutes since local midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Daypart {
    /// Days of the week on which the window applies.
    pub days_of_week: BTreeSet<u8>,
    /// First minute of the window.
    pub start_minute: u16,
    /// Last minute of the window.
    pub end_minute: u16,
}

impl Daypart {
    /// Returns true when the local weekday and minute fall inside the window.
    #[must_use]
    pub fn matches(&self, weekday_from_sunday: u8, minute_of_day: u16) -> bool {
        self.days_of_week.contains(&weekday_from_sunday)
            && self.start_minute <= minute_of_day
            && minute_of_day <= self.end_minute
    }
}

// ============================================================================
// SECTION: Candidate
// ============================================================================

/// Servable ad description provided by the catalog.
///
/// # Invariants
/// - `segments` is an ordered set; iteration order is deterministic.
/// - `pass_through_rate` is interpreted within `[0, 1]`.
/// - The pipeline never mutates candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Campaign identifier.
    pub campaign_id: CampaignId,
    /// Creative set identifier.
    pub creative_set_id: CreativeSetId,
    /// Creative instance identifier.
    pub creative_instance_id: CreativeInstanceId,
    /// Ad type of the creative.
    #[serde(default)]
    pub ad_type: AdType,
    /// Segments the candidate is eligible for.
    pub segments: BTreeSet<Segment>,
    /// Campaign priority; lower values are more important.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Selection weight; the highest weight wins within a segment.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Probability that the candidate survives per-candidate pacing.
    #[serde(default = "default_pass_through_rate")]
    pub pass_through_rate: f64,
    /// Frequency caps.
    #[serde(default)]
    pub caps: FrequencyCaps,
    /// Text embedding used for similarity-based exclusion.
    #[serde(default)]
    pub embedding: Vec<f64>,
    /// Geo targets (country or `country-subdivision` codes); empty means untargeted.
    #[serde(default)]
    pub geo_targets: BTreeSet<String>,
    /// Dayparts; empty means the candidate may serve at any time.
    #[serde(default)]
    pub dayparts: Vec<Daypart>,
    /// Catalog-level inappropriate flag.
    #[serde(default)]
    pub flagged: bool,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Landing page URL.
    pub target_url: String,
    /// Value credited when the ad is viewed.
    #[serde(default)]
    pub value: f64,
}

impl Candidate {
    /// Returns true when the candidate targets `segment`.
    #[must_use]
    pub fn has_segment(&self, segment: &Segment) -> bool {
        self.segments.contains(segment)
    }
}

/// Default campaign priority.
const fn default_priority() -> u32 {
    1
}

/// Default selection weight.
const fn default_weight() -> f64 {
    1.0
}

/// Default pass-through rate (never paced out).
const fn default_pass_through_rate() -> f64 {
    1.0
}
