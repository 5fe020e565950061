// crates/ad-serving-core/tests/serving_orchestrator.rs
// ============================================================================
// Module: Serving Orchestrator Tests
// Description: Tests for the per-opportunity serving state machine.
// Purpose: Validate stage ordering, suppression reasons, and candidate choice.
// ============================================================================

//! Serving orchestrator tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use ad_serving_core::AdState;
use ad_serving_core::AdType;
use ad_serving_core::CampaignId;
use ad_serving_core::Candidate;
use ad_serving_core::CandidateCatalog;
use ad_serving_core::CatalogError;
use ad_serving_core::ClientContext;
use ad_serving_core::ClientState;
use ad_serving_core::CreativeInstanceId;
use ad_serving_core::CreativeSetId;
use ad_serving_core::EpsilonGreedyBandit;
use ad_serving_core::FrequencyCaps;
use ad_serving_core::InMemoryAdEventHistory;
use ad_serving_core::InMemoryArmStore;
use ad_serving_core::InMemoryCatalog;
use ad_serving_core::PacingRandom;
use ad_serving_core::ParamsHandle;
use ad_serving_core::PlacementIdFactory;
use ad_serving_core::Segment;
use ad_serving_core::ServingOrchestrator;
use ad_serving_core::ServingParams;
use ad_serving_core::ServingStage;
use ad_serving_core::SuppressionReason;
use ad_serving_core::Timestamp;
use proptest::prelude::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Thursday 2026-01-01 12:00:00 UTC.
const NOON: Timestamp = Timestamp::from_unix_secs(1_767_268_800);

/// Builds a candidate whose ids all derive from `id`.
fn candidate(id: &str, segment: &str) -> Candidate {
    Candidate {
        campaign_id: CampaignId::new(format!("campaign-{id}")),
        creative_set_id: CreativeSetId::new(format!("set-{id}")),
        creative_instance_id: CreativeInstanceId::new(format!("instance-{id}")),
        ad_type: AdType::NotificationAd,
        segments: BTreeSet::from([Segment::new(segment)]),
        priority: 1,
        weight: 1.0,
        pass_through_rate: 1.0,
        caps: FrequencyCaps::default(),
        embedding: Vec::new(),
        geo_targets: BTreeSet::new(),
        dayparts: Vec::new(),
        flagged: false,
        title: format!("Title {id}"),
        body: format!("Body {id}"),
        target_url: format!("https://example.com/{id}"),
        value: 0.01,
    }
}

/// Orchestrator wiring shared by the tests.
struct Fixture<C> {
    /// Orchestrator under test.
    orchestrator: ServingOrchestrator<C, InMemoryAdEventHistory, InMemoryArmStore>,
    /// Client signals.
    client: ClientContext,
    /// Parameters.
    params: ParamsHandle,
    /// Random handle.
    random: PacingRandom,
}

/// Builds a fixture over `catalog` with interest in `interests`.
fn fixture<C: CandidateCatalog>(catalog: C, interests: &[&str]) -> Fixture<C> {
    let client = ClientContext::new(ClientState {
        interest_segments: interests.iter().copied().map(Segment::new).collect(),
        ..ClientState::default()
    });
    let params = ParamsHandle::new(ServingParams::default());
    let random = PacingRandom::seeded(11);
    let orchestrator = ServingOrchestrator::new(
        catalog,
        InMemoryAdEventHistory::new(),
        EpsilonGreedyBandit::new(InMemoryArmStore::new()),
        client.clone(),
        params.clone(),
        random.clone(),
    );
    Fixture {
        orchestrator,
        client,
        params,
        random,
    }
}

/// Catalog that counts lookups and optionally fails.
struct CountingCatalog {
    /// Lookup counter.
    calls: Arc<AtomicUsize>,
    /// True when lookups fail.
    fail: bool,
}

impl CandidateCatalog for CountingCatalog {
    fn eligible_candidates(
        &self,
        _segments: &BTreeSet<Segment>,
    ) -> Result<Vec<Candidate>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CatalogError::Unavailable("catalog offline".to_string()));
        }
        Ok(vec![candidate("a", "technology")])
    }
}

// ============================================================================
// SECTION: Commit Path
// ============================================================================

/// Tests that an eligible candidate is committed through every stage.
#[test]
fn commits_best_candidate_for_selected_segment() {
    let mut heavy = candidate("heavy", "technology");
    heavy.weight = 3.0;
    let catalog = InMemoryCatalog::new(vec![
        candidate("light", "technology"),
        heavy,
        candidate("travel", "travel"),
    ]);
    let fx = fixture(catalog, &["technology"]);
    let _guard = fx.random.override_for_testing(0.5).unwrap();

    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(
        decision.stages,
        vec![
            ServingStage::Idle,
            ServingStage::CheckingPermission,
            ServingStage::FilteringCandidates,
            ServingStage::Pacing,
            ServingStage::Selecting,
            ServingStage::Committed,
        ]
    );
    let ad = decision.committed_ad().unwrap();
    assert_eq!(ad.creative_instance_id.as_str(), "instance-heavy");
    assert_eq!(ad.placement_id.as_str(), "placement-1");
    assert_eq!(ad.state, AdState::Created);
    assert_eq!(ad.segment, Segment::new("technology"));
    assert_eq!(decision.selected_segment, Some(Segment::new("technology")));
    assert_eq!(decision.candidate_count, 2);
}

/// Tests that equal weights fall back to priority, then instance id.
#[test]
fn candidate_ties_use_priority_then_id() {
    let mut urgent = candidate("z", "technology");
    urgent.priority = 0;
    let catalog = InMemoryCatalog::new(vec![candidate("b", "technology"), urgent]);
    let fx = fixture(catalog, &["technology"]);
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    let ad = fx.orchestrator.serve(NOON).committed_ad().cloned().unwrap();
    assert_eq!(ad.creative_instance_id.as_str(), "instance-z");
}

/// Tests that a child segment matched through its requested parent becomes an
/// arm alongside an exact match.
#[test]
fn parent_matched_candidate_is_selectable() {
    let catalog = InMemoryCatalog::new(vec![
        candidate("exact", "technology"),
        candidate("child", "technology-computing"),
    ]);
    let fx = fixture(catalog, &["technology"]);
    // Both arms are unpulled, so the upper draw picks the second arm in order.
    let _guard = fx.random.override_for_testing(0.75).unwrap();
    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(decision.selected_segment, Some(Segment::new("technology-computing")));
    let ad = decision.committed_ad().unwrap();
    assert_eq!(ad.creative_instance_id.as_str(), "instance-child");
}

/// Tests that an empty interest set requests the untargeted segment.
#[test]
fn empty_interests_request_untargeted() {
    let catalog = InMemoryCatalog::new(vec![candidate("a", "travel")]);
    let fx = fixture(catalog, &[]);
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(decision.segments, BTreeSet::from([Segment::untargeted()]));
    assert_eq!(decision.selected_segment, Some(Segment::new("travel")));
}

/// Tests that placement ids use the configured factory.
#[test]
fn placement_ids_are_unique() {
    let catalog = InMemoryCatalog::new(vec![candidate("a", "technology")]);
    let fx = fixture(catalog, &["technology"]);
    let orchestrator = fx.orchestrator.with_placement_ids(PlacementIdFactory::new("slot"));
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    let first = orchestrator.serve(NOON).committed_ad().cloned().unwrap();
    let second = orchestrator.serve(NOON).committed_ad().cloned().unwrap();
    assert_eq!(first.placement_id.as_str(), "slot-1");
    assert_eq!(second.placement_id.as_str(), "slot-2");
}

// ============================================================================
// SECTION: Suppression
// ============================================================================

/// Tests that a permission denial ends the attempt before the catalog is read.
#[test]
fn permission_denial_skips_catalog() {
    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = CountingCatalog {
        calls: Arc::clone(&calls),
        fail: false,
    };
    let fx = fixture(catalog, &["technology"]);
    fx.client.update(|state| state.ads_enabled = false);

    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!decision.permission_granted());
    assert_eq!(decision.final_stage(), ServingStage::Suppressed);
    assert!(decision.segments.is_empty());
    match decision.suppression() {
        Some(SuppressionReason::PermissionDenied { rule, message }) => {
            assert_eq!(rule, "ads_enabled");
            assert_eq!(message, "User has not opted in to ads");
        }
        other => panic!("unexpected suppression: {other:?}"),
    }
}

/// Tests that catalog failures become data-unavailable suppressions.
#[test]
fn catalog_failure_is_data_unavailable() {
    let catalog = CountingCatalog {
        calls: Arc::new(AtomicUsize::new(0)),
        fail: true,
    };
    let fx = fixture(catalog, &["technology"]);
    let decision = fx.orchestrator.serve(NOON);
    assert!(matches!(
        decision.suppression(),
        Some(SuppressionReason::DataUnavailable { message }) if message.contains("catalog offline")
    ));
}

/// Tests that an empty catalog response suppresses with no candidates.
#[test]
fn empty_catalog_suppresses() {
    let fx = fixture(InMemoryCatalog::new(Vec::new()), &["technology"]);
    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(decision.suppression(), Some(&SuppressionReason::NoCandidates));
    assert!(decision.permission_granted());
}

/// Tests that excluded candidates never reach selection.
#[test]
fn excluded_candidates_are_not_selected() {
    let mut flagged = candidate("flagged", "technology");
    flagged.flagged = true;
    flagged.weight = 10.0;
    let catalog = InMemoryCatalog::new(vec![flagged.clone(), candidate("clean", "technology")]);
    let fx = fixture(catalog, &["technology"]);
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(decision.committed_ad().unwrap().creative_instance_id.as_str(), "instance-clean");
    assert_eq!(decision.excluded.len(), 1);
    assert_eq!(decision.excluded[0].creative_instance_id, flagged.creative_instance_id);

    let only_flagged = fixture(InMemoryCatalog::new(vec![flagged]), &["technology"]);
    let suppressed = only_flagged.orchestrator.serve(NOON);
    assert_eq!(suppressed.suppression(), Some(&SuppressionReason::AllCandidatesExcluded));
}

/// Tests that the pass-level draw can pace out the whole attempt.
#[test]
fn pass_level_pacing_suppresses() {
    let catalog = InMemoryCatalog::new(vec![candidate("a", "technology")]);
    let fx = fixture(catalog, &["technology"]);
    fx.params.update(|params| params.pacing.threshold = 0.3);
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    let decision = fx.orchestrator.serve(NOON);
    match decision.suppression() {
        Some(SuppressionReason::PacedOut { draw, threshold }) => {
            assert!((draw - 0.5).abs() < f64::EPSILON);
            assert!((threshold - 0.3).abs() < f64::EPSILON);
        }
        other => panic!("unexpected suppression: {other:?}"),
    }
    assert!(!decision.stages.contains(&ServingStage::Selecting));
}

/// Tests that per-candidate pacing can drop every candidate.
#[test]
fn candidate_pacing_suppresses() {
    let mut rare = candidate("a", "technology");
    rare.pass_through_rate = 0.1;
    let fx = fixture(InMemoryCatalog::new(vec![rare]), &["technology"]);
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    let decision = fx.orchestrator.serve(NOON);
    assert_eq!(decision.suppression(), Some(&SuppressionReason::AllCandidatesPaced));
}

/// Tests that parameter changes apply to the next attempt.
#[test]
fn reconfiguration_applies_to_next_attempt() {
    let mut flagged = candidate("a", "technology");
    flagged.flagged = true;
    let fx = fixture(InMemoryCatalog::new(vec![flagged]), &["technology"]);
    let _guard = fx.random.override_for_testing(0.5).unwrap();
    assert!(fx.orchestrator.serve(NOON).committed_ad().is_none());

    fx.params.update(|params| {
        params.exclusion.disabled.insert("marked_as_inappropriate".to_string());
    });
    assert!(fx.orchestrator.serve(NOON).committed_ad().is_some());
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Tests that every decision starts at the permission check and ends in a
    /// terminal stage, and that a committed ad was never excluded.
    #[test]
    fn decisions_are_well_formed(
        seed in any::<u64>(),
        flags in proptest::collection::vec(any::<bool>(), 0..6),
        rates in proptest::collection::vec(0.0f64..=1.0, 1..6),
    ) {
        let candidates: Vec<Candidate> = flags
            .iter()
            .zip(rates.iter().cycle())
            .enumerate()
            .map(|(index, (flagged, rate))| {
                let mut candidate = candidate(&index.to_string(), "technology");
                candidate.flagged = *flagged;
                candidate.pass_through_rate = *rate;
                candidate
            })
            .collect();
        let client = ClientContext::new(ClientState::default());
        let orchestrator = ServingOrchestrator::new(
            InMemoryCatalog::new(candidates),
            InMemoryAdEventHistory::new(),
            EpsilonGreedyBandit::new(InMemoryArmStore::new()),
            client,
            ParamsHandle::new(ServingParams::default()),
            PacingRandom::seeded(seed),
        );
        let decision = orchestrator.serve(NOON);
        prop_assert_eq!(&decision.stages[..2], &[ServingStage::Idle, ServingStage::CheckingPermission]);
        let last = decision.final_stage();
        prop_assert!(last == ServingStage::Committed || last == ServingStage::Suppressed);
        if let Some(ad) = decision.committed_ad() {
            prop_assert!(decision
                .excluded
                .iter()
                .all(|record| record.creative_instance_id != ad.creative_instance_id));
        }
    }
}
