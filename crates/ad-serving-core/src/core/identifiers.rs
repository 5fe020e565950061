// crates/ad-serving-core/src/core/identifiers.rs
// ============================================================================
// Module: Ad Serving Identifiers
// Description: Canonical opaque identifiers for campaigns, creatives, and placements.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout the serving pipeline.
//! String identifiers are opaque and serialize transparently. Segments carry
//! a small amount of structure (`parent-child`) used for targeting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Declares an opaque string identifier newtype with the shared helper impls.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier! {
    /// Campaign identifier from the catalog.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    CampaignId
}

string_identifier! {
    /// Creative set identifier grouping creative instances of one campaign.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    CreativeSetId
}

string_identifier! {
    /// Creative instance identifier for a single servable creative.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    CreativeInstanceId
}

string_identifier! {
    /// Placement identifier assigned when a serving opportunity commits.
    ///
    /// # Invariants
    /// - Unique per committed ad within a process lifetime.
    PlacementId
}

string_identifier! {
    /// Transaction identifier issued by the ledger collaborator.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; embedded verbatim in redemption URLs.
    TransactionId
}

// ============================================================================
// SECTION: Segments
// ============================================================================

/// Separator between parent and child segment labels.
const SEGMENT_SEPARATOR: char = '-';

/// Segment label used when the client has no interest segments.
const UNTARGETED_SEGMENT: &str = "untargeted";

/// Topic/interest label used for targeting and as the bandit arm identity.
///
/// # Invariants
/// - Labels are compared case-sensitively; callers normalize on ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Segment(String);

impl Segment {
    /// Creates a new segment label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the fallback segment used when no interest segments exist.
    #[must_use]
    pub fn untargeted() -> Self {
        Self(UNTARGETED_SEGMENT.to_string())
    }

    /// Returns true for the untargeted fallback segment.
    #[must_use]
    pub fn is_untargeted(&self) -> bool {
        self.0 == UNTARGETED_SEGMENT
    }

    /// Returns the parent segment (`technology` for `technology-computing`).
    #[must_use]
    pub fn parent(&self) -> Self {
        self.0
            .split_once(SEGMENT_SEPARATOR)
            .map_or_else(|| self.clone(), |(parent, _)| Self(parent.to_string()))
    }

    /// Returns the segment label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Identifier for a pending confirmation redemption task.
///
/// # Invariants
/// - Assigned monotonically by the pending redemption set; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionRequestId(u64);

impl RedemptionRequestId {
    /// Creates a redemption request identifier from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RedemptionRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
