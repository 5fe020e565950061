// crates/ad-serving-core/src/interfaces/mod.rs
// ============================================================================
// Module: Ad Serving Interfaces
// Description: Backend-agnostic collaborator interfaces for the serving pipeline.
// Purpose: Define the contract surfaces for catalogs, history, ledger, and transport.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the serving pipeline reaches storage, network, and
//! UI collaborators without embedding backend details. Collaborator errors
//! never abort the host: the orchestrator treats them as a suppressed
//! opportunity and the event handler reports them as warnings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdEventRecord;
use crate::core::AdEventType;
use crate::core::AdType;
use crate::core::BanditArm;
use crate::core::CampaignId;
use crate::core::Candidate;
use crate::core::ConfirmationType;
use crate::core::CreativeInstanceId;
use crate::core::CreativeSetId;
use crate::core::NotificationAdInfo;
use crate::core::OptedInCredential;
use crate::core::RedemptionRequestId;
use crate::core::Segment;
use crate::core::Timestamp;
use crate::core::TransactionInfo;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Catalog errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog could not be read.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only source of servable candidates.
pub trait CandidateCatalog {
    /// Returns the candidates eligible for any of `segments`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog cannot answer.
    fn eligible_candidates(
        &self,
        segments: &BTreeSet<Segment>,
    ) -> Result<Vec<Candidate>, CatalogError>;
}

// ============================================================================
// SECTION: Event History
// ============================================================================

/// Scope over which ad events are counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventScope {
    /// Events for one creative instance.
    CreativeInstance(CreativeInstanceId),
    /// Events for one creative set.
    CreativeSet(CreativeSetId),
    /// Events for one campaign.
    Campaign(CampaignId),
    /// Events for every ad of one type.
    AdType(AdType),
}

impl EventScope {
    /// Returns true when `record` falls within the scope.
    #[must_use]
    pub fn matches(&self, record: &AdEventRecord) -> bool {
        match self {
            Self::CreativeInstance(id) => record.creative_instance_id == *id,
            Self::CreativeSet(id) => record.creative_set_id == *id,
            Self::Campaign(id) => record.campaign_id == *id,
            Self::AdType(ad_type) => record.ad_type == *ad_type,
        }
    }
}

/// Event history errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// History backend could not answer.
    #[error("event history unavailable: {0}")]
    Unavailable(String),
}

/// Record/query interface over stored ad events.
pub trait AdEventHistory {
    /// Counts events of `event_type` in `scope` that happened strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the history cannot be read.
    fn event_count(
        &self,
        scope: &EventScope,
        event_type: AdEventType,
        since: Timestamp,
    ) -> Result<u64, HistoryError>;

    /// Returns the time of the most recent event of `event_type` in `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the history cannot be read.
    fn last_event_time(
        &self,
        scope: &EventScope,
        event_type: AdEventType,
    ) -> Result<Option<Timestamp>, HistoryError>;

    /// Appends an event record.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the record cannot be stored.
    fn record_event(&self, record: AdEventRecord) -> Result<(), HistoryError>;
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Ledger errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger rejected or failed to store the transaction.
    #[error("ledger error: {0}")]
    Ledger(String),
}

/// Transaction ledger collaborator.
pub trait TransactionLedger {
    /// Records a transaction for an ad event.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the transaction cannot be recorded.
    fn record_transaction(
        &self,
        creative_instance_id: &CreativeInstanceId,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
        value: f64,
        at: Timestamp,
    ) -> Result<TransactionInfo, LedgerError>;
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Source of opted-in confirmation credentials.
///
/// Token blinding and signing live behind this interface.
pub trait CredentialIssuer {
    /// Returns credential data for `transaction`, or `None` to confirm opted-out.
    fn credential_for(&self, transaction: &TransactionInfo) -> Option<OptedInCredential>;
}

// ============================================================================
// SECTION: Redemption Transport
// ============================================================================

/// HTTP method for redemption requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrlRequestMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
}

/// Transport-neutral HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRequest {
    /// Absolute request URL.
    pub url: String,
    /// Request method.
    pub method: UrlRequestMethod,
    /// Request headers as `name: value` pairs.
    pub headers: Vec<String>,
    /// Request body.
    pub content: String,
    /// Content type of the body.
    pub content_type: String,
}

/// Transport-neutral HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlResponse {
    /// Final request URL.
    pub url: String,
    /// HTTP status code.
    pub status_code: u16,
    /// Response body.
    pub body: String,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
}

/// Transport errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request was rejected before sending.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Request could not be completed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Network transport used to redeem confirmations.
pub trait RedemptionTransport {
    /// Sends `request` and returns the response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    fn send(&self, request: &UrlRequest) -> Result<UrlResponse, TransportError>;
}

// ============================================================================
// SECTION: Delegates
// ============================================================================

/// Notification UI delegate. Every method defaults to a no-op.
pub trait NotificationAdObserver: Send + Sync {
    /// A serving opportunity passed the permission gate.
    fn on_opportunity_arose(&self, _segments: &BTreeSet<Segment>) {}

    /// A serving opportunity was suppressed.
    fn on_failed_to_serve(&self) {}

    /// The ad was served.
    fn on_ad_served(&self, _ad: &NotificationAdInfo) {}

    /// The ad was viewed.
    fn on_ad_viewed(&self, _ad: &NotificationAdInfo) {}

    /// The ad was clicked.
    fn on_ad_clicked(&self, _ad: &NotificationAdInfo) {}

    /// The ad was dismissed.
    fn on_ad_dismissed(&self, _ad: &NotificationAdInfo) {}

    /// The ad timed out.
    fn on_ad_timed_out(&self, _ad: &NotificationAdInfo) {}
}

/// Completion delegate for confirmation redemption.
///
/// Exactly one of the two methods is called per redemption attempt.
pub trait RedeemConfirmationDelegate {
    /// The confirmation was redeemed.
    fn on_did_redeem(&self, _request_id: RedemptionRequestId, _transaction: &TransactionInfo) {}

    /// The redemption attempt failed.
    fn on_failed_to_redeem(
        &self,
        _request_id: RedemptionRequestId,
        _transaction: &TransactionInfo,
        _should_retry: bool,
        _should_backoff: bool,
    ) {
    }
}

// ============================================================================
// SECTION: Bandit Arm Store
// ============================================================================

/// Bandit arm store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ArmStoreError {
    /// Store I/O failed.
    #[error("arm store io error: {0}")]
    Io(String),
    /// Stored data is corrupt.
    #[error("arm store corrupt: {0}")]
    Corrupt(String),
    /// Write would decrease an arm's pull count.
    #[error("arm store rejected non-monotonic write for segment {segment}: {stored} -> {proposed}")]
    NonMonotonic {
        /// Segment of the rejected write.
        segment: Segment,
        /// Stored pull count.
        stored: u64,
        /// Proposed pull count.
        proposed: u64,
    },
}

/// Persistent storage for bandit arms.
pub trait BanditArmStore {
    /// Loads every stored arm keyed by segment.
    ///
    /// # Errors
    ///
    /// Returns [`ArmStoreError`] when arms cannot be loaded.
    fn load_arms(&self) -> Result<BTreeMap<Segment, BanditArm>, ArmStoreError>;

    /// Saves `arm`, rejecting writes that would decrease its pull count.
    ///
    /// # Errors
    ///
    /// Returns [`ArmStoreError`] when the arm cannot be saved.
    fn save_arm(&self, arm: &BanditArm) -> Result<(), ArmStoreError>;

    /// Removes every stored arm.
    ///
    /// # Errors
    ///
    /// Returns [`ArmStoreError`] when the store cannot be cleared.
    fn clear(&self) -> Result<(), ArmStoreError>;
}
