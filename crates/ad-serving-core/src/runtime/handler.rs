// crates/ad-serving-core/src/runtime/handler.rs
// ============================================================================
// Module: Ad Serving Notification Ad Handler
// Description: Host-facing entry point wiring serving to lifecycle tracking.
// Purpose: Serve notification ads on demand or at regular intervals.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`NotificationAdHandler`] owns one [`ServingOrchestrator`] and one
//! [`NotificationAdEventHandler`]. Every call takes `&mut self`, so serving
//! commits and reward updates run on a single logical sequence. A committed
//! ad is tracked and moved to `Served` before the call returns; abandoned
//! opportunities never leave a tracked ad behind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::AdEventType;
use crate::core::ClientContext;
use crate::core::NotificationAdInfo;
use crate::core::ParamsHandle;
use crate::core::PlacementId;
use crate::core::Timestamp;
use crate::interfaces::AdEventHistory;
use crate::interfaces::BanditArmStore;
use crate::interfaces::CandidateCatalog;
use crate::interfaces::CredentialIssuer;
use crate::interfaces::NotificationAdObserver;
use crate::interfaces::RedeemConfirmationDelegate;
use crate::interfaces::RedemptionTransport;
use crate::interfaces::TransactionLedger;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::ServingAuditEvent;
use crate::runtime::bandit::EpsilonGreedyBandit;
use crate::runtime::events::AdEventOutcome;
use crate::runtime::events::EventError;
use crate::runtime::events::EventHandlerParts;
use crate::runtime::events::NotificationAdEventHandler;
use crate::runtime::observers::ObserverId;
use crate::runtime::pacing::PacingRandom;
use crate::runtime::redemption::RedemptionReport;
use crate::runtime::serving::ServingDecision;
use crate::runtime::serving::ServingOrchestrator;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Seconds per hour, divided by the hourly cap to get the serving interval.
const SECONDS_PER_HOUR: u64 = 3_600;

/// Collaborators for [`NotificationAdHandler::new`].
pub struct HandlerParts<C, H, L, S> {
    /// Candidate catalog.
    pub catalog: C,
    /// Ad event history shared by serving and lifecycle tracking.
    pub history: H,
    /// Transaction ledger.
    pub ledger: L,
    /// Bandit arm store shared by serving and lifecycle tracking.
    pub arms: S,
    /// Shared client signals.
    pub client: ClientContext,
    /// Shared parameters.
    pub params: ParamsHandle,
    /// Shared random handle.
    pub random: PacingRandom,
    /// Opted-in credential source.
    pub credentials: Box<dyn CredentialIssuer>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
}

/// Host-facing notification ad entry point.
pub struct NotificationAdHandler<C, H, L, S> {
    /// Serving orchestrator.
    orchestrator: ServingOrchestrator<C, H, S>,
    /// Lifecycle state machine.
    events: NotificationAdEventHandler<H, L, S>,
    /// Shared parameters.
    params: ParamsHandle,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Next time a regular-interval serve is due.
    next_regular_serve: Option<Timestamp>,
}

impl<C, H, L, S> NotificationAdHandler<C, H, L, S>
where
    C: CandidateCatalog,
    H: AdEventHistory + Clone,
    L: TransactionLedger,
    S: BanditArmStore + Clone,
{
    /// Creates a handler from its collaborators.
    #[must_use]
    pub fn new(parts: HandlerParts<C, H, L, S>) -> Self {
        let orchestrator = ServingOrchestrator::new(
            parts.catalog,
            parts.history.clone(),
            EpsilonGreedyBandit::new(parts.arms.clone()),
            parts.client.clone(),
            parts.params.clone(),
            parts.random,
        );
        let events = NotificationAdEventHandler::new(EventHandlerParts {
            history: parts.history,
            ledger: parts.ledger,
            bandit: EpsilonGreedyBandit::new(parts.arms),
            params: parts.params.clone(),
            client: parts.client,
            credentials: parts.credentials,
            audit: Arc::clone(&parts.audit),
        });
        Self {
            orchestrator,
            events,
            params: parts.params,
            audit: parts.audit,
            next_regular_serve: None,
        }
    }

    /// Replaces the orchestrator, keeping lifecycle state.
    #[must_use]
    pub fn with_orchestrator(mut self, orchestrator: ServingOrchestrator<C, H, S>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Returns the orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &ServingOrchestrator<C, H, S> {
        &self.orchestrator
    }

    /// Returns the lifecycle handler.
    #[must_use]
    pub const fn events(&self) -> &NotificationAdEventHandler<H, L, S> {
        &self.events
    }

    /// Registers a delegate without taking ownership.
    pub fn add_observer(&mut self, observer: &Arc<dyn NotificationAdObserver>) -> ObserverId {
        self.events.observers_mut().add(observer)
    }

    /// Unregisters a delegate.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.events.observers_mut().remove(id)
    }

    /// Runs one serving opportunity and, on commit, serves the ad.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when the committed ad cannot be tracked.
    pub fn maybe_serve(&mut self, now: Timestamp) -> Result<ServingDecision, EventError> {
        let decision = self.orchestrator.serve(now);
        self.audit.record_serving(&ServingAuditEvent::from_decision(&decision));
        if decision.permission_granted() {
            let segments = &decision.segments;
            self.events.observers_mut().for_each(|observer| observer.on_opportunity_arose(segments));
        }
        match decision.committed_ad() {
            Some(ad) => {
                let placement_id = ad.placement_id.clone();
                self.events.track(ad.clone())?;
                self.events.trigger_event(&placement_id, AdEventType::Served, now)?;
            }
            None => self.events.observers_mut().for_each(|observer| observer.on_failed_to_serve()),
        }
        Ok(decision)
    }

    /// Serves when the regular interval (`1h / ads_per_hour`) has elapsed.
    ///
    /// Returns `Ok(None)` when no serve is due or the hourly cap is zero.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when the committed ad cannot be tracked.
    pub fn maybe_serve_at_regular_intervals(
        &mut self,
        now: Timestamp,
    ) -> Result<Option<ServingDecision>, EventError> {
        let ads_per_hour = self.params.snapshot().permission.ads_per_hour;
        if ads_per_hour == 0 {
            return Ok(None);
        }
        if self.next_regular_serve.is_some_and(|due| now < due) {
            return Ok(None);
        }
        let interval = Duration::from_secs(SECONDS_PER_HOUR / u64::from(ads_per_hour));
        self.next_regular_serve = Some(now.saturating_add(interval));
        self.maybe_serve(now).map(Some)
    }

    /// Applies a lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when the placement is untracked or the transition is invalid.
    pub fn trigger_event(
        &mut self,
        placement_id: &PlacementId,
        event_type: AdEventType,
        now: Timestamp,
    ) -> Result<AdEventOutcome, EventError> {
        self.events.trigger_event(placement_id, event_type, now)
    }

    /// Returns the tracked ad for `placement_id`.
    #[must_use]
    pub fn tracked(&self, placement_id: &PlacementId) -> Option<&NotificationAdInfo> {
        self.events.tracked(placement_id)
    }

    /// Runs due confirmation redemptions.
    pub fn process_redemptions(
        &mut self,
        transport: &dyn RedemptionTransport,
        delegate: &dyn RedeemConfirmationDelegate,
        now: Timestamp,
    ) -> Vec<RedemptionReport> {
        self.events.process_redemptions(transport, delegate, now)
    }

    /// Ends the session, dropping tracked ads and the regular-interval schedule.
    pub fn end_session(&mut self) {
        self.events.clear();
        self.next_regular_serve = None;
    }
}
