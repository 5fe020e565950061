// crates/ad-serving-core/src/lib.rs
// ============================================================================
// Module: Ad Serving Core Library
// Description: Public API surface for the notification ad serving core.
// Purpose: Expose domain types, collaborator interfaces, and runtime stages.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The ad serving core decides whether an ad may be shown for an opportunity,
//! which candidate is selected, and how the selected ad's lifecycle events
//! are tracked. It gates on permission rules, filters candidates through
//! exclusion rules, paces probabilistically, and selects a segment with an
//! epsilon-greedy bandit. Storage, network, and UI are reached only through
//! the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::AdEventHistory;
pub use interfaces::ArmStoreError;
pub use interfaces::BanditArmStore;
pub use interfaces::CandidateCatalog;
pub use interfaces::CatalogError;
pub use interfaces::CredentialIssuer;
pub use interfaces::EventScope;
pub use interfaces::HistoryError;
pub use interfaces::LedgerError;
pub use interfaces::NotificationAdObserver;
pub use interfaces::RedeemConfirmationDelegate;
pub use interfaces::RedemptionTransport;
pub use interfaces::TransactionLedger;
pub use interfaces::TransportError;
pub use interfaces::UrlRequest;
pub use interfaces::UrlRequestMethod;
pub use interfaces::UrlResponse;
pub use runtime::*;
