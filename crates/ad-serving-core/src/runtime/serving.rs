// crates/ad-serving-core/src/runtime/serving.rs
// ============================================================================
// Module: Ad Serving Orchestrator
// Description: Per-opportunity state machine sequencing every serving stage.
// Purpose: Turn a serving opportunity into an auditable commit or suppression.
// Dependencies: crate::{core, interfaces, runtime}, serde
// ============================================================================

//! ## Overview
//! [`ServingOrchestrator::serve`] runs one opportunity through
//! `Idle -> CheckingPermission -> FilteringCandidates -> Pacing -> Selecting`
//! and ends in `Committed` or `Suppressed`. Every suppression is a normal
//! outcome: collaborator failures are reported as
//! [`SuppressionReason::DataUnavailable`] and never escape as errors.
//!
//! Parameters and client state are re-read at each stage so that
//! reconfiguration applies to the next stage that runs.
//!
//! # Invariants
//! - Candidates dropped by an exclusion rule never reach arm selection.
//! - A permission denial ends the attempt before the catalog is consulted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Candidate;
use crate::core::ClientContext;
use crate::core::NotificationAdInfo;
use crate::core::ParamsHandle;
use crate::core::PlacementId;
use crate::core::Segment;
use crate::core::Timestamp;
use crate::interfaces::AdEventHistory;
use crate::interfaces::BanditArmStore;
use crate::interfaces::CandidateCatalog;
use crate::runtime::bandit::EpsilonGreedyBandit;
use crate::runtime::exclusion::ExclusionContext;
use crate::runtime::exclusion::ExclusionRecord;
use crate::runtime::exclusion::ExclusionRules;
use crate::runtime::pacing::PacingRandom;
use crate::runtime::pacing::admit_pass;
use crate::runtime::pacing::pace_candidates;
use crate::runtime::permission::PermissionContext;
use crate::runtime::permission::PermissionRules;

// ============================================================================
// SECTION: Decision Model
// ============================================================================

/// Stage of a serving attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStage {
    /// Waiting for a trigger.
    Idle,
    /// Evaluating permission rules.
    CheckingPermission,
    /// Retrieving and filtering candidates.
    FilteringCandidates,
    /// Applying pacing.
    Pacing,
    /// Selecting an arm and candidate.
    Selecting,
    /// A candidate was committed.
    Committed,
    /// The attempt was suppressed.
    Suppressed,
}

/// Reason a serving attempt was suppressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressionReason {
    /// A permission rule denied serving.
    PermissionDenied {
        /// Denying rule.
        rule: String,
        /// Denial message.
        message: String,
    },
    /// A collaborator could not answer.
    DataUnavailable {
        /// Failure description.
        message: String,
    },
    /// The catalog returned no candidates.
    NoCandidates,
    /// Every candidate was excluded.
    AllCandidatesExcluded,
    /// The pass-level pacing draw rejected the pass.
    PacedOut {
        /// Draw used.
        draw: f64,
        /// Threshold in effect.
        threshold: f64,
    },
    /// Per-candidate pacing dropped every candidate.
    AllCandidatesPaced,
    /// No arm could be selected.
    NoArmSelected,
}

/// Terminal outcome of a serving attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ServingOutcome {
    /// A notification ad was committed.
    Committed {
        /// Committed ad in the `Created` state.
        ad: NotificationAdInfo,
    },
    /// The attempt was suppressed.
    Suppressed {
        /// Suppression reason.
        reason: SuppressionReason,
    },
}

/// Auditable record of one serving attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingDecision {
    /// Decision time.
    pub decided_at: Timestamp,
    /// Final outcome.
    pub outcome: ServingOutcome,
    /// Stages visited in order.
    pub stages: Vec<ServingStage>,
    /// Segments requested from the catalog; empty when permission was denied.
    pub segments: BTreeSet<Segment>,
    /// Candidates returned by the catalog.
    pub candidate_count: usize,
    /// Candidates dropped by exclusion rules.
    pub excluded: Vec<ExclusionRecord>,
    /// Segment chosen by the bandit.
    pub selected_segment: Option<Segment>,
}

impl ServingDecision {
    /// Returns the committed ad, if any.
    #[must_use]
    pub const fn committed_ad(&self) -> Option<&NotificationAdInfo> {
        match &self.outcome {
            ServingOutcome::Committed { ad } => Some(ad),
            ServingOutcome::Suppressed { .. } => None,
        }
    }

    /// Returns the suppression reason, if any.
    #[must_use]
    pub const fn suppression(&self) -> Option<&SuppressionReason> {
        match &self.outcome {
            ServingOutcome::Suppressed { reason } => Some(reason),
            ServingOutcome::Committed { .. } => None,
        }
    }

    /// Returns true when the permission gate passed.
    #[must_use]
    pub fn permission_granted(&self) -> bool {
        self.stages.contains(&ServingStage::FilteringCandidates)
    }

    /// Returns the final stage.
    #[must_use]
    pub fn final_stage(&self) -> ServingStage {
        self.stages.last().copied().unwrap_or(ServingStage::Idle)
    }
}

// ============================================================================
// SECTION: Placement Ids
// ============================================================================

/// Issues unique placement identifiers.
#[derive(Debug)]
pub struct PlacementIdFactory {
    /// Prefix embedded in every identifier.
    prefix: String,
    /// Monotonic counter.
    counter: AtomicU64,
}

impl PlacementIdFactory {
    /// Creates a factory with the provided prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the next placement identifier.
    pub fn next_id(&self) -> PlacementId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        PlacementId::new(format!("{}-{seq}", self.prefix))
    }
}

impl Default for PlacementIdFactory {
    fn default() -> Self {
        Self::new("placement")
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Sequences permission, exclusion, pacing, and selection for an opportunity.
pub struct ServingOrchestrator<C, H, S> {
    /// Candidate catalog.
    catalog: C,
    /// Ad event history.
    history: H,
    /// Segment selector.
    bandit: EpsilonGreedyBandit<S>,
    /// Permission chain.
    permission_rules: PermissionRules,
    /// Exclusion chain.
    exclusion_rules: ExclusionRules,
    /// Shared client signals.
    client: ClientContext,
    /// Shared parameters.
    params: ParamsHandle,
    /// Shared random handle.
    random: PacingRandom,
    /// Placement identifier source.
    placements: PlacementIdFactory,
}

impl<C, H, S> ServingOrchestrator<C, H, S>
where
    C: CandidateCatalog,
    H: AdEventHistory,
    S: BanditArmStore,
{
    /// Creates an orchestrator with the standard notification ad rule chains.
    #[must_use]
    pub fn new(
        catalog: C,
        history: H,
        bandit: EpsilonGreedyBandit<S>,
        client: ClientContext,
        params: ParamsHandle,
        random: PacingRandom,
    ) -> Self {
        Self {
            catalog,
            history,
            bandit,
            permission_rules: PermissionRules::notification_ads(),
            exclusion_rules: ExclusionRules::notification_ads(),
            client,
            params,
            random,
            placements: PlacementIdFactory::default(),
        }
    }

    /// Replaces the permission chain.
    #[must_use]
    pub fn with_permission_rules(mut self, rules: PermissionRules) -> Self {
        self.permission_rules = rules;
        self
    }

    /// Replaces the exclusion chain.
    #[must_use]
    pub fn with_exclusion_rules(mut self, rules: ExclusionRules) -> Self {
        self.exclusion_rules = rules;
        self
    }

    /// Replaces the placement identifier factory.
    #[must_use]
    pub fn with_placement_ids(mut self, placements: PlacementIdFactory) -> Self {
        self.placements = placements;
        self
    }

    /// Returns the bandit.
    #[must_use]
    pub const fn bandit(&self) -> &EpsilonGreedyBandit<S> {
        &self.bandit
    }

    /// Returns the event history.
    #[must_use]
    pub const fn history(&self) -> &H {
        &self.history
    }

    /// Runs one serving attempt at `now`.
    pub fn serve(&self, now: Timestamp) -> ServingDecision {
        let mut decision = ServingDecision {
            decided_at: now,
            outcome: ServingOutcome::Suppressed {
                reason: SuppressionReason::NoCandidates,
            },
            stages: vec![ServingStage::Idle, ServingStage::CheckingPermission],
            segments: BTreeSet::new(),
            candidate_count: 0,
            excluded: Vec::new(),
            selected_segment: None,
        };

        let state = self.client.snapshot();
        let params = self.params.snapshot();
        let permission_ctx = PermissionContext {
            state: &state,
            params: &params,
            history: &self.history,
            now,
        };
        match self.permission_rules.evaluate(&permission_ctx) {
            Err(err) => return suppress(decision, data_unavailable(&err)),
            Ok(report) if !report.should_allow() => {
                let reason = SuppressionReason::PermissionDenied {
                    rule: report.denied_by.unwrap_or_default(),
                    message: report.message.unwrap_or_default(),
                };
                return suppress(decision, reason);
            }
            Ok(_) => {}
        }

        decision.stages.push(ServingStage::FilteringCandidates);
        let state = self.client.snapshot();
        let params = self.params.snapshot();
        decision.segments = if state.interest_segments.is_empty() {
            BTreeSet::from([Segment::untargeted()])
        } else {
            state.interest_segments.clone()
        };
        let candidates = match self.catalog.eligible_candidates(&decision.segments) {
            Ok(candidates) => candidates,
            Err(err) => return suppress(decision, data_unavailable(&err)),
        };
        decision.candidate_count = candidates.len();
        if candidates.is_empty() {
            return suppress(decision, SuppressionReason::NoCandidates);
        }
        let exclusion_ctx = ExclusionContext {
            state: &state,
            params: &params,
            history: &self.history,
            now,
        };
        let filtered = match self.exclusion_rules.apply(candidates, &exclusion_ctx) {
            Ok(filtered) => filtered,
            Err(err) => return suppress(decision, data_unavailable(&err)),
        };
        decision.excluded = filtered.excluded;
        if filtered.eligible.is_empty() {
            return suppress(decision, SuppressionReason::AllCandidatesExcluded);
        }

        decision.stages.push(ServingStage::Pacing);
        let params = self.params.snapshot();
        let admission = admit_pass(&self.random, params.pacing.threshold);
        if !admission.admitted {
            let reason = SuppressionReason::PacedOut {
                draw: admission.draw,
                threshold: admission.threshold,
            };
            return suppress(decision, reason);
        }
        let paced = pace_candidates(&self.random, filtered.eligible);
        if paced.is_empty() {
            return suppress(decision, SuppressionReason::AllCandidatesPaced);
        }

        decision.stages.push(ServingStage::Selecting);
        let params = self.params.snapshot();
        let arms = arm_segments(&paced, &decision.segments);
        let segment = match self.bandit.select_arm(&arms, params.bandit.epsilon, &self.random) {
            Ok(Some(segment)) => segment,
            Ok(None) => return suppress(decision, SuppressionReason::NoArmSelected),
            Err(err) => return suppress(decision, data_unavailable(&err)),
        };
        let Some(candidate) = best_candidate(&paced, &segment) else {
            return suppress(decision, SuppressionReason::NoArmSelected);
        };
        let ad = NotificationAdInfo::from_candidate(
            self.placements.next_id(),
            candidate,
            segment.clone(),
        );
        decision.selected_segment = Some(segment);
        decision.stages.push(ServingStage::Committed);
        decision.outcome = ServingOutcome::Committed { ad };
        decision
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Finalizes `decision` as suppressed.
fn suppress(mut decision: ServingDecision, reason: SuppressionReason) -> ServingDecision {
    decision.stages.push(ServingStage::Suppressed);
    decision.outcome = ServingOutcome::Suppressed { reason };
    decision
}

/// Builds a data-unavailable reason from a collaborator error.
fn data_unavailable(err: &dyn std::error::Error) -> SuppressionReason {
    SuppressionReason::DataUnavailable {
        message: err.to_string(),
    }
}

/// Returns the arms to select from: candidate segments that were requested
/// directly or through their parent, or every candidate segment when none were.
fn arm_segments(candidates: &[Candidate], requested: &BTreeSet<Segment>) -> BTreeSet<Segment> {
    let all: BTreeSet<Segment> =
        candidates.iter().flat_map(|candidate| candidate.segments.iter().cloned()).collect();
    let matching: BTreeSet<Segment> = all
        .iter()
        .filter(|segment| requested.contains(*segment) || requested.contains(&segment.parent()))
        .cloned()
        .collect();
    if matching.is_empty() { all } else { matching }
}

/// Returns the highest-weighted candidate in `segment`.
///
/// Ties go to the lower priority value, then to the lowest creative instance id.
fn best_candidate<'a>(candidates: &'a [Candidate], segment: &Segment) -> Option<&'a Candidate> {
    candidates.iter().filter(|candidate| candidate.has_segment(segment)).min_by(|lhs, rhs| {
        rhs.weight
            .total_cmp(&lhs.weight)
            .then_with(|| lhs.priority.cmp(&rhs.priority))
            .then_with(|| lhs.creative_instance_id.cmp(&rhs.creative_instance_id))
    })
}
