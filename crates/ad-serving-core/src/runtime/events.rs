// crates/ad-serving-core/src/runtime/events.rs
// ============================================================================
// Module: Ad Serving Notification Ad Event Handler
// Description: Per-placement lifecycle state machine for notification ads.
// Purpose: Apply ordered lifecycle events and fan out their side effects.
// Dependencies: crate::{core, interfaces, runtime}, thiserror
// ============================================================================

//! ## Overview
//! [`NotificationAdEventHandler`] tracks committed ads by placement id and
//! accepts lifecycle events in the order
//! `Created -> Served -> Viewed -> {Clicked, Dismissed, TimedOut}`. Ad types
//! listed in `click_from_served_ad_types` may also go `Served -> Clicked`.
//!
//! Rejected triggers change nothing and are reported as [`EventError`].
//! Accepted triggers notify observers, record history, update the bandit on
//! terminal events, record a ledger transaction, and queue its confirmation
//! for redemption. Collaborator failures after a transition is applied are
//! returned as warnings; the transition itself stands.
//!
//! # Invariants
//! - An ad reaches at most one terminal state.
//! - Terminal transitions remove the ad from tracking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdEventRecord;
use crate::core::AdEventType;
use crate::core::AdState;
use crate::core::ClientContext;
use crate::core::ConfirmationInfo;
use crate::core::EventParams;
use crate::core::NotificationAdInfo;
use crate::core::ParamsHandle;
use crate::core::PlacementId;
use crate::core::RedemptionRequestId;
use crate::core::Timestamp;
use crate::core::TransactionInfo;
use crate::interfaces::AdEventHistory;
use crate::interfaces::BanditArmStore;
use crate::interfaces::CredentialIssuer;
use crate::interfaces::RedeemConfirmationDelegate;
use crate::interfaces::RedemptionTransport;
use crate::interfaces::TransactionLedger;
use crate::runtime::audit::AdEventAuditEvent;
use crate::runtime::audit::AdEventAuditParams;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::RedemptionAuditEvent;
use crate::runtime::bandit::EpsilonGreedyBandit;
use crate::runtime::observers::ObserverList;
use crate::runtime::redemption::PendingRedemptions;
use crate::runtime::redemption::RedemptionReport;

// ============================================================================
// SECTION: Errors and Outcomes
// ============================================================================

/// Event handler errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - No variant leaves a tracked ad modified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// No ad is tracked under the placement id.
    #[error("placement {0} is not tracked")]
    UntrackedPlacement(PlacementId),
    /// The event is not valid from the ad's current state.
    #[error("event {event} is not valid for placement {placement_id} in state {from:?}")]
    InvalidTransition {
        /// Placement identifier.
        placement_id: PlacementId,
        /// Current state.
        from: AdState,
        /// Rejected event.
        event: AdEventType,
    },
    /// An ad is already tracked under the placement id.
    #[error("placement {0} is already tracked")]
    DuplicatePlacement(PlacementId),
}

/// Result of an accepted trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdEventOutcome {
    /// Ad after the transition.
    pub ad: NotificationAdInfo,
    /// Transaction recorded by the ledger, if any.
    pub transaction: Option<TransactionInfo>,
    /// Redemption queued for the transaction, if any.
    pub redemption: Option<RedemptionRequestId>,
    /// Collaborator failures that did not undo the transition.
    pub warnings: Vec<String>,
}

/// Returns true when `event` may be applied to an ad in `from`.
#[must_use]
pub fn is_valid_transition(
    from: AdState,
    event: AdEventType,
    ad: &NotificationAdInfo,
    params: &EventParams,
) -> bool {
    match event {
        AdEventType::Served => from == AdState::Created,
        AdEventType::Viewed => from == AdState::Served,
        AdEventType::Clicked => {
            from == AdState::Viewed
                || (from == AdState::Served && params.allows_click_from_served(ad.ad_type))
        }
        AdEventType::Dismissed | AdEventType::TimedOut => from == AdState::Viewed,
    }
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Lifecycle state machine for tracked notification ads.
pub struct NotificationAdEventHandler<H, L, S> {
    /// Tracked ads keyed by placement id.
    tracked: BTreeMap<PlacementId, NotificationAdInfo>,
    /// Ad event history.
    history: H,
    /// Transaction ledger.
    ledger: L,
    /// Bandit receiving rewards.
    bandit: EpsilonGreedyBandit<S>,
    /// Shared parameters.
    params: ParamsHandle,
    /// Shared client signals.
    client: ClientContext,
    /// Registered observers.
    observers: ObserverList,
    /// Opted-in credential source.
    credentials: Box<dyn CredentialIssuer>,
    /// Pending confirmation redemptions.
    redemptions: PendingRedemptions,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

/// Collaborators for [`NotificationAdEventHandler::new`].
pub struct EventHandlerParts<H, L, S> {
    /// Ad event history.
    pub history: H,
    /// Transaction ledger.
    pub ledger: L,
    /// Bandit receiving rewards.
    pub bandit: EpsilonGreedyBandit<S>,
    /// Shared parameters.
    pub params: ParamsHandle,
    /// Shared client signals.
    pub client: ClientContext,
    /// Opted-in credential source.
    pub credentials: Box<dyn CredentialIssuer>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
}

impl<H, L, S> NotificationAdEventHandler<H, L, S>
where
    H: AdEventHistory,
    L: TransactionLedger,
    S: BanditArmStore,
{
    /// Creates a handler with no tracked ads.
    #[must_use]
    pub fn new(parts: EventHandlerParts<H, L, S>) -> Self {
        Self {
            tracked: BTreeMap::new(),
            history: parts.history,
            ledger: parts.ledger,
            bandit: parts.bandit,
            params: parts.params,
            client: parts.client,
            observers: ObserverList::new(),
            credentials: parts.credentials,
            redemptions: PendingRedemptions::new(),
            audit: parts.audit,
        }
    }

    /// Starts tracking a committed ad.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DuplicatePlacement`] when the placement is already tracked.
    pub fn track(&mut self, ad: NotificationAdInfo) -> Result<(), EventError> {
        if self.tracked.contains_key(&ad.placement_id) {
            return Err(EventError::DuplicatePlacement(ad.placement_id));
        }
        self.tracked.insert(ad.placement_id.clone(), ad);
        Ok(())
    }

    /// Returns the tracked ad for `placement_id`.
    #[must_use]
    pub fn tracked(&self, placement_id: &PlacementId) -> Option<&NotificationAdInfo> {
        self.tracked.get(placement_id)
    }

    /// Returns the number of tracked ads.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Ends the session, dropping every tracked ad.
    pub fn clear(&mut self) {
        self.tracked.clear();
    }

    /// Returns the observer registry.
    pub const fn observers_mut(&mut self) -> &mut ObserverList {
        &mut self.observers
    }

    /// Returns the pending redemptions.
    #[must_use]
    pub const fn redemptions(&self) -> &PendingRedemptions {
        &self.redemptions
    }

    /// Applies `event_type` to the ad tracked under `placement_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when the placement is untracked or the transition
    /// is not valid; the tracked ad is left unchanged.
    pub fn trigger_event(
        &mut self,
        placement_id: &PlacementId,
        event_type: AdEventType,
        now: Timestamp,
    ) -> Result<AdEventOutcome, EventError> {
        let params = self.params.snapshot();
        let Some(current) = self.tracked.get(placement_id) else {
            let err = EventError::UntrackedPlacement(placement_id.clone());
            self.audit_rejection(placement_id, event_type, None, &err, now);
            return Err(err);
        };
        if !is_valid_transition(current.state, event_type, current, &params.events) {
            let err = EventError::InvalidTransition {
                placement_id: placement_id.clone(),
                from: current.state,
                event: event_type,
            };
            let state = Some(current.state);
            self.audit_rejection(placement_id, event_type, state, &err, now);
            return Err(err);
        }

        let mut ad = current.clone();
        ad.state = event_type.target_state();
        if ad.state.is_terminal() {
            self.tracked.remove(placement_id);
        } else {
            self.tracked.insert(placement_id.clone(), ad.clone());
        }

        self.observers.notify_event(&ad, event_type);
        let mut warnings = Vec::new();
        if let Err(err) = self.history.record_event(AdEventRecord::for_ad(&ad, event_type, now)) {
            warnings.push(err.to_string());
        }
        if let Some(reward) = event_type.reward()
            && let Err(err) = self.bandit.update_reward(&ad.segment, reward)
        {
            warnings.push(err.to_string());
        }
        let value = if event_type == AdEventType::Viewed { ad.value } else { 0.0 };
        let (transaction, redemption) = match self.ledger.record_transaction(
            &ad.creative_instance_id,
            ad.ad_type,
            event_type.confirmation_type(),
            value,
            now,
        ) {
            Ok(transaction) => {
                let opted_in = if self.client.snapshot().rewards_opted_in {
                    self.credentials.credential_for(&transaction)
                } else {
                    None
                };
                let confirmation = ConfirmationInfo::from_transaction(&transaction, opted_in);
                let request_id =
                    self.redemptions.enqueue(confirmation, transaction.clone(), now);
                (Some(transaction), Some(request_id))
            }
            Err(err) => {
                warnings.push(err.to_string());
                (None, None)
            }
        };

        self.audit.record_ad_event(&AdEventAuditEvent::new(AdEventAuditParams {
            at: now,
            placement_id: placement_id.clone(),
            event_type,
            state: Some(ad.state),
            accepted: true,
            messages: warnings.clone(),
        }));
        Ok(AdEventOutcome {
            ad,
            transaction,
            redemption,
            warnings,
        })
    }

    /// Runs due confirmation redemptions.
    pub fn process_redemptions(
        &mut self,
        transport: &dyn RedemptionTransport,
        delegate: &dyn RedeemConfirmationDelegate,
        now: Timestamp,
    ) -> Vec<RedemptionReport> {
        let params = self.params.snapshot();
        let reports = self.redemptions.process_due(transport, &params.redemption, delegate, now);
        for report in &reports {
            self.audit.record_redemption(&RedemptionAuditEvent::new(now, report.clone()));
        }
        reports
    }

    /// Records a rejected trigger.
    fn audit_rejection(
        &self,
        placement_id: &PlacementId,
        event_type: AdEventType,
        state: Option<AdState>,
        err: &EventError,
        now: Timestamp,
    ) {
        self.audit.record_ad_event(&AdEventAuditEvent::new(AdEventAuditParams {
            at: now,
            placement_id: placement_id.clone(),
            event_type,
            state,
            accepted: false,
            messages: vec![err.to_string()],
        }));
    }
}
