// crates/ad-serving-core/src/runtime/mod.rs
// ============================================================================
// Module: Ad Serving Runtime
// Description: Serving stages, lifecycle tracking, redemption, and collaborators.
// Purpose: Execute serving opportunities and ad events against the interfaces.
// Dependencies: crate::{core, interfaces}, rand, serde_json, tokio
// ============================================================================

//! ## Overview
//! Runtime modules implement each serving stage and the lifecycle state
//! machine. Hosts normally drive [`NotificationAdHandler`]; the individual
//! stages are public so they can be evaluated and tested in isolation.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod bandit;
pub mod events;
pub mod exclusion;
pub mod handler;
pub mod observers;
pub mod pacing;
pub mod permission;
pub mod redemption;
pub mod serving;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AdEventAuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RedemptionAuditEvent;
pub use audit::ServingAuditEvent;
pub use audit::StderrAuditSink;
pub use bandit::BanditError;
pub use bandit::EpsilonGreedyBandit;
pub use events::AdEventOutcome;
pub use events::EventError;
pub use events::EventHandlerParts;
pub use events::NotificationAdEventHandler;
pub use exclusion::CapKind;
pub use exclusion::ExclusionContext;
pub use exclusion::ExclusionError;
pub use exclusion::ExclusionRecord;
pub use exclusion::ExclusionRule;
pub use exclusion::ExclusionRules;
pub use exclusion::ExclusionVerdict;
pub use exclusion::FilterResult;
pub use handler::HandlerParts;
pub use handler::NotificationAdHandler;
pub use observers::ChannelObserver;
pub use observers::NotificationAdEvent;
pub use observers::ObserverId;
pub use observers::ObserverList;
pub use pacing::FixedRandomSource;
pub use pacing::PacingError;
pub use pacing::PacingRandom;
pub use pacing::RandomSource;
pub use pacing::ScopedRandomOverride;
pub use pacing::SeededRandomSource;
pub use pacing::ThreadRandomSource;
pub use permission::PermissionContext;
pub use permission::PermissionError;
pub use permission::PermissionReport;
pub use permission::PermissionRule;
pub use permission::PermissionRules;
pub use permission::PermissionVerdict;
pub use redemption::PendingRedemptions;
pub use redemption::RedeemConfirmation;
pub use redemption::RedemptionAttempt;
pub use redemption::RedemptionError;
pub use redemption::RedemptionReport;
pub use redemption::RedemptionStatus;
pub use serving::PlacementIdFactory;
pub use serving::ServingDecision;
pub use serving::ServingOrchestrator;
pub use serving::ServingOutcome;
pub use serving::ServingStage;
pub use serving::SuppressionReason;
pub use store::InMemoryAdEventHistory;
pub use store::InMemoryArmStore;
pub use store::InMemoryCatalog;
pub use store::InMemoryTransactionLedger;
pub use store::JsonFileArmStore;
pub use store::OptedOutCredentialIssuer;
