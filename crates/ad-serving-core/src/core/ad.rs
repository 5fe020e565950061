// crates/ad-serving-core/src/core/ad.rs
// ============================================================================
// Module: Ad Serving Ad Model
// Description: Ad types, event types, confirmation types, and tracked ads.
// Purpose: Define the lifecycle model for notification ads.
// Dependencies: crate::core::{candidate, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`NotificationAdInfo`] is created when the orchestrator commits a
//! selection and is tracked by placement id until it reaches a terminal
//! [`AdState`]. Events map onto confirmation types for the ledger and the
//! redemption protocol.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::candidate::Candidate;
use crate::core::identifiers::CampaignId;
use crate::core::identifiers::CreativeInstanceId;
use crate::core::identifiers::CreativeSetId;
use crate::core::identifiers::PlacementId;
use crate::core::identifiers::Segment;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Ad Types
// ============================================================================

/// Ad surface that a creative is served on.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    /// Operating-system notification ad.
    #[default]
    NotificationAd,
    /// New tab page ad.
    NewTabPageAd,
    /// Promoted content ad.
    PromotedContentAd,
    /// Inline content ad.
    InlineContentAd,
    /// Search result ad.
    SearchResultAd,
}

impl AdType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotificationAd => "notification_ad",
            Self::NewTabPageAd => "new_tab_page_ad",
            Self::PromotedContentAd => "promoted_content_ad",
            Self::InlineContentAd => "inline_content_ad",
            Self::SearchResultAd => "search_result_ad",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Lifecycle event triggered for a tracked ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdEventType {
    /// The ad was shown.
    Served,
    /// The ad was viewed.
    Viewed,
    /// The ad was clicked.
    Clicked,
    /// The ad was dismissed.
    Dismissed,
    /// The ad timed out without interaction.
    TimedOut,
}

impl AdEventType {
    /// Returns true for events that end an ad's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Clicked | Self::Dismissed | Self::TimedOut)
    }

    /// Returns the bandit reward for terminal events.
    #[must_use]
    pub const fn reward(self) -> Option<f64> {
        match self {
            Self::Clicked => Some(1.0),
            Self::Dismissed | Self::TimedOut => Some(0.0),
            Self::Served | Self::Viewed => None,
        }
    }

    /// Returns the ad state reached by this event.
    #[must_use]
    pub const fn target_state(self) -> AdState {
        match self {
            Self::Served => AdState::Served,
            Self::Viewed => AdState::Viewed,
            Self::Clicked => AdState::Clicked,
            Self::Dismissed => AdState::Dismissed,
            Self::TimedOut => AdState::TimedOut,
        }
    }

    /// Returns the confirmation type recorded for this event.
    #[must_use]
    pub const fn confirmation_type(self) -> ConfirmationType {
        match self {
            Self::Served => ConfirmationType::Served,
            Self::Viewed => ConfirmationType::Viewed,
            Self::Clicked => ConfirmationType::Clicked,
            Self::Dismissed => ConfirmationType::Dismissed,
            Self::TimedOut => ConfirmationType::TimedOut,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::Viewed => "viewed",
            Self::Clicked => "clicked",
            Self::Dismissed => "dismissed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for AdEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmation type reported to the ledger and redemption endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfirmationType {
    /// Served confirmation.
    #[serde(rename = "served")]
    Served,
    /// View confirmation.
    #[serde(rename = "view")]
    Viewed,
    /// Click confirmation.
    #[serde(rename = "click")]
    Clicked,
    /// Dismiss confirmation.
    #[serde(rename = "dismiss")]
    Dismissed,
    /// Timed-out confirmation.
    #[serde(rename = "timed_out")]
    TimedOut,
}

impl ConfirmationType {
    /// Returns the wire label used by the confirmation endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::Viewed => "view",
            Self::Clicked => "click",
            Self::Dismissed => "dismiss",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ConfirmationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Ad State
// ============================================================================

/// Lifecycle state of a tracked notification ad.
///
/// # Invariants
/// - `Clicked`, `Dismissed`, and `TimedOut` are terminal and mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdState {
    /// Committed but not yet shown.
    #[default]
    Created,
    /// Shown to the user.
    Served,
    /// Viewed by the user.
    Viewed,
    /// Clicked by the user.
    Clicked,
    /// Dismissed by the user.
    Dismissed,
    /// Timed out without interaction.
    TimedOut,
}

impl AdState {
    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Clicked | Self::Dismissed | Self::TimedOut)
    }
}

// ============================================================================
// SECTION: Notification Ad
// ============================================================================

/// Notification ad tracked from commit until a terminal event.
///
/// # Invariants
/// - `placement_id` is unique among tracked ads.
/// - `state` only moves forward along the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAdInfo {
    /// Placement identifier assigned at commit.
    pub placement_id: PlacementId,
    /// Creative instance identifier.
    pub creative_instance_id: CreativeInstanceId,
    /// Creative set identifier.
    pub creative_set_id: CreativeSetId,
    /// Campaign identifier.
    pub campaign_id: CampaignId,
    /// Segment chosen by the bandit.
    pub segment: Segment,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Landing page URL.
    pub target_url: String,
    /// Ad type.
    pub ad_type: AdType,
    /// Value credited when viewed.
    pub value: f64,
    /// Current lifecycle state.
    pub state: AdState,
}

impl NotificationAdInfo {
    /// Builds a freshly created ad from a selected candidate.
    #[must_use]
    pub fn from_candidate(
        placement_id: PlacementId,
        candidate: &Candidate,
        segment: Segment,
    ) -> Self {
        Self {
            placement_id,
            creative_instance_id: candidate.creative_instance_id.clone(),
            creative_set_id: candidate.creative_set_id.clone(),
            campaign_id: candidate.campaign_id.clone(),
            segment,
            title: candidate.title.clone(),
            body: candidate.body.clone(),
            target_url: candidate.target_url.clone(),
            ad_type: candidate.ad_type,
            value: candidate.value,
            state: AdState::Created,
        }
    }
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Ad event stored by the event-history collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdEventRecord {
    /// Placement identifier.
    pub placement_id: PlacementId,
    /// Campaign identifier.
    pub campaign_id: CampaignId,
    /// Creative set identifier.
    pub creative_set_id: CreativeSetId,
    /// Creative instance identifier.
    pub creative_instance_id: CreativeInstanceId,
    /// Segment of the ad.
    pub segment: Segment,
    /// Ad type.
    pub ad_type: AdType,
    /// Event type.
    pub event_type: AdEventType,
    /// Event time.
    pub created_at: Timestamp,
}

impl AdEventRecord {
    /// Builds an event record for a tracked ad.
    #[must_use]
    pub fn for_ad(ad: &NotificationAdInfo, event_type: AdEventType, created_at: Timestamp) -> Self {
        Self {
            placement_id: ad.placement_id.clone(),
            campaign_id: ad.campaign_id.clone(),
            creative_set_id: ad.creative_set_id.clone(),
            creative_instance_id: ad.creative_instance_id.clone(),
            segment: ad.segment.clone(),
            ad_type: ad.ad_type,
            event_type,
            created_at,
        }
    }
}
