// crates/ad-serving-core/tests/exclusion_rules.rs
// ============================================================================
// Module: Exclusion Rule Tests
// Description: Tests for per-candidate exclusion rules and the filter chain.
// Purpose: Validate frequency caps, user preferences, targeting, and idempotence.
// ============================================================================

//! Exclusion rule and filter chain tests.

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
use std::time::Duration;

use ad_serving_core::AdEventHistory;
use ad_serving_core::AdEventRecord;
use ad_serving_core::AdEventType;
use ad_serving_core::AdType;
use ad_serving_core::CampaignId;
use ad_serving_core::Candidate;
use ad_serving_core::ClientState;
use ad_serving_core::CreativeInstanceId;
use ad_serving_core::CreativeSetId;
use ad_serving_core::Daypart;
use ad_serving_core::ExclusionContext;
use ad_serving_core::ExclusionRules;
use ad_serving_core::FilterResult;
use ad_serving_core::FrequencyCaps;
use ad_serving_core::InMemoryAdEventHistory;
use ad_serving_core::PlacementId;
use ad_serving_core::Segment;
use ad_serving_core::ServingParams;
use ad_serving_core::Timestamp;
use ad_serving_core::runtime::exclusion::ANTI_TARGETING;
use ad_serving_core::runtime::exclusion::DAYPART;
use ad_serving_core::runtime::exclusion::DISMISSED;
use ad_serving_core::runtime::exclusion::EMBEDDING_SIMILARITY;
use ad_serving_core::runtime::exclusion::MARKED_AS_INAPPROPRIATE;
use ad_serving_core::runtime::exclusion::MARKED_TO_NO_LONGER_RECEIVE;
use ad_serving_core::runtime::exclusion::SUBDIVISION_TARGETING;
use ad_serving_core::runtime::exclusion::cosine_similarity;
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

/// Returns an event record for `candidate`.
fn record(candidate: &Candidate, event_type: AdEventType, at: Timestamp) -> AdEventRecord {
    AdEventRecord {
        placement_id: PlacementId::new("placement"),
        campaign_id: candidate.campaign_id.clone(),
        creative_set_id: candidate.creative_set_id.clone(),
        creative_instance_id: candidate.creative_instance_id.clone(),
        segment: Segment::new("technology"),
        ad_type: candidate.ad_type,
        event_type,
        created_at: at,
    }
}

/// Applies the standard chain.
fn apply(
    candidates: Vec<Candidate>,
    state: &ClientState,
    params: &ServingParams,
    history: &InMemoryAdEventHistory,
    now: Timestamp,
) -> FilterResult {
    let ctx = ExclusionContext {
        state,
        params,
        history,
        now,
    };
    ExclusionRules::notification_ads().apply(candidates, &ctx).unwrap()
}

/// Returns the rule that excluded the only excluded candidate.
fn excluded_by(result: &FilterResult) -> &str {
    assert_eq!(result.excluded.len(), 1, "expected exactly one exclusion: {result:?}");
    &result.excluded[0].rule
}

// ============================================================================
// SECTION: Frequency Caps
// ============================================================================

/// Tests that the hourly cap counts serves of the creative instance.
#[test]
fn per_hour_cap_excludes_at_cap() {
    let mut capped = candidate("a", "technology");
    capped.caps.per_hour = 1;
    let history = InMemoryAdEventHistory::new();
    history
        .record_event(record(&capped, AdEventType::Served, NOON.saturating_sub(Duration::from_secs(60))))
        .unwrap();

    let result = apply(
        vec![capped, candidate("b", "technology")],
        &ClientState::default(),
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert_eq!(excluded_by(&result), "per_hour");
    assert_eq!(result.excluded[0].uuid, "instance-a:1");
    assert_eq!(result.eligible.len(), 1);
    assert_eq!(result.eligible[0].creative_instance_id.as_str(), "instance-b");
}

/// Tests that serves outside the cap window do not count.
#[test]
fn per_day_cap_ignores_old_serves() {
    let mut capped = candidate("a", "technology");
    capped.caps.per_day = 1;
    let history = InMemoryAdEventHistory::new();
    history
        .record_event(record(
            &capped,
            AdEventType::Served,
            NOON.saturating_sub(Duration::from_secs(86_400 + 1)),
        ))
        .unwrap();
    let result = apply(
        vec![capped],
        &ClientState::default(),
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert!(result.excluded.is_empty());
}

/// Tests that the total cap counts serves over all time.
#[test]
fn total_max_counts_all_time() {
    let mut capped = candidate("a", "technology");
    capped.caps.total_max = 2;
    let history = InMemoryAdEventHistory::new();
    let long_ago = Timestamp::from_unix_secs(1_600_000_000);
    history.record_event(record(&capped, AdEventType::Served, long_ago)).unwrap();
    history.record_event(record(&capped, AdEventType::Served, long_ago)).unwrap();
    let result = apply(
        vec![capped],
        &ClientState::default(),
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert_eq!(excluded_by(&result), "total_max");
}

/// Tests that the daily campaign cap spans creative sets in the campaign.
#[test]
fn daily_cap_is_scoped_to_campaign() {
    let mut first = candidate("a", "technology");
    first.caps.daily_cap = 1;
    let mut sibling = first.clone();
    sibling.creative_set_id = CreativeSetId::new("set-sibling");
    sibling.creative_instance_id = CreativeInstanceId::new("instance-sibling");
    let history = InMemoryAdEventHistory::new();
    history
        .record_event(record(&first, AdEventType::Served, NOON.saturating_sub(Duration::from_secs(60))))
        .unwrap();
    let result = apply(
        vec![sibling],
        &ClientState::default(),
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert_eq!(excluded_by(&result), "daily_cap");
}

/// Tests that a dismissed creative set is excluded once it reaches the cap.
#[test]
fn dismissed_cap_excludes_creative_set() {
    let target = candidate("a", "technology");
    let history = InMemoryAdEventHistory::new();
    let recent = NOON.saturating_sub(Duration::from_secs(3_600));
    history.record_event(record(&target, AdEventType::Dismissed, recent)).unwrap();
    let params = ServingParams::default();
    let once = apply(vec![target.clone()], &ClientState::default(), &params, &history, NOON);
    assert!(once.excluded.is_empty());

    history.record_event(record(&target, AdEventType::Dismissed, recent)).unwrap();
    let twice = apply(vec![target], &ClientState::default(), &params, &history, NOON);
    assert_eq!(excluded_by(&twice), DISMISSED);
}

// ============================================================================
// SECTION: User Preferences
// ============================================================================

/// Tests that flagged creative sets are excluded with a descriptive message.
#[test]
fn marked_as_inappropriate_excludes_flagged_set() {
    let history = InMemoryAdEventHistory::new();
    let state = ClientState {
        flagged_creative_sets: BTreeSet::from([CreativeSetId::new("set-a")]),
        ..ClientState::default()
    };
    let result = apply(
        vec![candidate("a", "technology"), candidate("b", "technology")],
        &state,
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert_eq!(excluded_by(&result), MARKED_AS_INAPPROPRIATE);
    assert_eq!(
        result.excluded[0].message,
        "creativeSetId set-a excluded due to being marked as inappropriate"
    );
}

/// Tests that a flagged candidate is excluded even when a clean candidate of
/// the same creative set was evaluated first.
#[test]
fn flagged_candidate_excluded_after_clean_sibling() {
    let history = InMemoryAdEventHistory::new();
    let clean = candidate("a", "technology");
    let mut flagged = candidate("b", "technology");
    flagged.creative_set_id = clean.creative_set_id.clone();
    flagged.flagged = true;
    let result = apply(
        vec![clean, flagged],
        &ClientState::default(),
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert_eq!(excluded_by(&result), MARKED_AS_INAPPROPRIATE);
    assert_eq!(result.excluded[0].creative_instance_id.as_str(), "instance-b");
    assert_eq!(result.excluded[0].uuid, "set-a");
    assert_eq!(result.eligible.len(), 1);
    assert_eq!(result.eligible[0].creative_instance_id.as_str(), "instance-a");
}

/// Tests that disliking a parent segment excludes its children.
#[test]
fn disliked_parent_segment_excludes_child() {
    let history = InMemoryAdEventHistory::new();
    let state = ClientState {
        disliked_segments: BTreeSet::from([Segment::new("technology")]),
        ..ClientState::default()
    };
    let result = apply(
        vec![candidate("a", "technology-computing"), candidate("b", "travel")],
        &state,
        &ServingParams::default(),
        &history,
        NOON,
    );
    assert_eq!(excluded_by(&result), MARKED_TO_NO_LONGER_RECEIVE);
    assert_eq!(result.eligible[0].creative_instance_id.as_str(), "instance-b");
}

/// Tests that a disabled rule never excludes.
#[test]
fn disabled_rule_is_skipped() {
    let history = InMemoryAdEventHistory::new();
    let mut flagged = candidate("a", "technology");
    flagged.flagged = true;
    let mut params = ServingParams::default();
    params.exclusion.disabled.insert(MARKED_AS_INAPPROPRIATE.to_string());
    let result = apply(vec![flagged], &ClientState::default(), &params, &history, NOON);
    assert!(result.excluded.is_empty());
}

// ============================================================================
// SECTION: Targeting
// ============================================================================

/// Tests subdivision matching by exact code and by country prefix.
#[test]
fn subdivision_targeting_matches_code_or_country() {
    let history = InMemoryAdEventHistory::new();
    let params = ServingParams::default();
    let mut exact = candidate("exact", "technology");
    exact.geo_targets = BTreeSet::from(["US-CA".to_string()]);
    let mut country = candidate("country", "technology");
    country.geo_targets = BTreeSet::from(["US".to_string()]);
    let mut elsewhere = candidate("elsewhere", "technology");
    elsewhere.geo_targets = BTreeSet::from(["GB".to_string()]);

    let state = ClientState {
        subdivision: Some("US-CA".to_string()),
        ..ClientState::default()
    };
    let result =
        apply(vec![exact.clone(), country, elsewhere], &state, &params, &history, NOON);
    assert_eq!(excluded_by(&result), SUBDIVISION_TARGETING);
    assert_eq!(result.excluded[0].creative_instance_id.as_str(), "instance-elsewhere");

    let unknown = apply(vec![exact], &ClientState::default(), &params, &history, NOON);
    assert_eq!(excluded_by(&unknown), SUBDIVISION_TARGETING);
}

/// Tests that visiting an anti-targeted site excludes the creative set.
#[test]
fn anti_targeting_excludes_after_site_visit() {
    let history = InMemoryAdEventHistory::new();
    let mut params = ServingParams::default();
    params
        .exclusion
        .anti_targeting
        .insert(CreativeSetId::new("set-a"), BTreeSet::from(["https://competitor.example".to_string()]));
    let state = ClientState {
        visited_sites: BTreeSet::from(["https://competitor.example".to_string()]),
        ..ClientState::default()
    };
    let result = apply(vec![candidate("a", "technology")], &state, &params, &history, NOON);
    assert_eq!(excluded_by(&result), ANTI_TARGETING);
}

/// Tests that dayparts use the client's local weekday and minute.
#[test]
fn daypart_uses_local_schedule() {
    let history = InMemoryAdEventHistory::new();
    let params = ServingParams::default();
    let mut morning = candidate("a", "technology");
    // Thursday 09:00 to 13:00.
    morning.dayparts = vec![Daypart {
        days_of_week: BTreeSet::from([4]),
        start_minute: 9 * 60,
        end_minute: 13 * 60,
    }];
    let utc = apply(vec![morning.clone()], &ClientState::default(), &params, &history, NOON);
    assert!(utc.excluded.is_empty());

    let tokyo = ClientState {
        utc_offset_minutes: 9 * 60,
        ..ClientState::default()
    };
    let shifted = apply(vec![morning], &tokyo, &params, &history, NOON);
    assert_eq!(excluded_by(&shifted), DAYPART);
}

/// Tests that embedding similarity below the minimum excludes.
#[test]
fn embedding_similarity_threshold() {
    let history = InMemoryAdEventHistory::new();
    let mut params = ServingParams::default();
    params.exclusion.min_embedding_similarity = Some(0.5);
    let mut aligned = candidate("aligned", "technology");
    aligned.embedding = vec![1.0, 0.0];
    let mut orthogonal = candidate("orthogonal", "technology");
    orthogonal.embedding = vec![0.0, 1.0];
    let state = ClientState {
        page_embedding: Some(vec![1.0, 0.1]),
        ..ClientState::default()
    };
    let result = apply(vec![aligned, orthogonal], &state, &params, &history, NOON);
    assert_eq!(excluded_by(&result), EMBEDDING_SIMILARITY);
    assert_eq!(result.eligible[0].creative_instance_id.as_str(), "instance-aligned");
}

/// Tests cosine similarity edge cases.
#[test]
fn cosine_similarity_rejects_incomparable_vectors() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Tests that filtering the eligible set again excludes nothing.
    #[test]
    fn filtering_is_idempotent(
        flags in proptest::collection::vec(any::<bool>(), 1..8),
        caps in proptest::collection::vec(0u32..3, 1..8),
        served in 0usize..4,
    ) {
        let history = InMemoryAdEventHistory::new();
        let candidates: Vec<Candidate> = flags
            .iter()
            .zip(caps.iter().cycle())
            .enumerate()
            .map(|(index, (flagged, cap))| {
                let mut candidate = candidate(&index.to_string(), "technology");
                candidate.flagged = *flagged;
                candidate.caps.per_hour = *cap;
                candidate
            })
            .collect();
        for candidate in &candidates {
            for _ in 0..served {
                history
                    .record_event(record(
                        candidate,
                        AdEventType::Served,
                        NOON.saturating_sub(Duration::from_secs(60)),
                    ))
                    .unwrap();
            }
        }
        let state = ClientState::default();
        let params = ServingParams::default();
        let first = apply(candidates.clone(), &state, &params, &history, NOON);
        let again = apply(first.eligible.clone(), &state, &params, &history, NOON);
        prop_assert!(again.excluded.is_empty());
        prop_assert_eq!(&again.eligible, &first.eligible);
        prop_assert_eq!(first.eligible.len() + first.excluded.len(), candidates.len());
    }
}
