// crates/ad-serving-core/src/core/mod.rs
// ============================================================================
// Module: Ad Serving Core Types
// Description: Canonical domain types for the ad serving pipeline.
// Purpose: Provide stable, serializable types shared by every serving stage.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Core types describe candidates, tracked ads, bandit arms, transactions,
//! client signals, and parameters. They carry no behavior beyond small
//! helpers so that rules and processors stay the single source of decisions.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod ad;
pub mod arms;
pub mod candidate;
pub mod context;
pub mod identifiers;
pub mod params;
pub mod time;
pub mod transaction;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use ad::AdEventRecord;
pub use ad::AdEventType;
pub use ad::AdState;
pub use ad::AdType;
pub use ad::ConfirmationType;
pub use ad::NotificationAdInfo;
pub use arms::BanditArm;
pub use arms::OPTIMISTIC_INITIAL_REWARD;
pub use candidate::Candidate;
pub use candidate::Daypart;
pub use candidate::FrequencyCaps;
pub use context::ClientContext;
pub use context::ClientState;
pub use context::Platform;
pub use identifiers::CampaignId;
pub use identifiers::CreativeInstanceId;
pub use identifiers::CreativeSetId;
pub use identifiers::PlacementId;
pub use identifiers::RedemptionRequestId;
pub use identifiers::Segment;
pub use identifiers::TransactionId;
pub use params::BanditParams;
pub use params::EventParams;
pub use params::ExclusionParams;
pub use params::PacingParams;
pub use params::ParamsHandle;
pub use params::PermissionParams;
pub use params::QuietHours;
pub use params::RedemptionParams;
pub use params::ServingParams;
pub use time::Clock;
pub use time::FixedClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use transaction::ConfirmationInfo;
pub use transaction::OptedInCredential;
pub use transaction::TransactionInfo;
