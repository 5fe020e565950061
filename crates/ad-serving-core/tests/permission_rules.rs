// crates/ad-serving-core/tests/permission_rules.rs
// ============================================================================
// Module: Permission Rule Tests
// Description: Tests for global admission gates and the permission chain.
// Purpose: Validate AND composition, short-circuiting, and rule configuration.
// ============================================================================

//! Permission rule and chain tests.

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

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ad_serving_core::AdEventHistory;
use ad_serving_core::AdEventRecord;
use ad_serving_core::AdEventType;
use ad_serving_core::AdType;
use ad_serving_core::CampaignId;
use ad_serving_core::ClientState;
use ad_serving_core::CreativeInstanceId;
use ad_serving_core::CreativeSetId;
use ad_serving_core::EventScope;
use ad_serving_core::HistoryError;
use ad_serving_core::InMemoryAdEventHistory;
use ad_serving_core::PermissionContext;
use ad_serving_core::PermissionError;
use ad_serving_core::PermissionRule;
use ad_serving_core::PermissionRules;
use ad_serving_core::PermissionVerdict;
use ad_serving_core::PlacementId;
use ad_serving_core::Platform;
use ad_serving_core::QuietHours;
use ad_serving_core::Segment;
use ad_serving_core::ServingParams;
use ad_serving_core::Timestamp;
use ad_serving_core::runtime::permission::ADS_ENABLED;
use ad_serving_core::runtime::permission::ADS_PER_DAY;
use ad_serving_core::runtime::permission::ADS_PER_HOUR;
use ad_serving_core::runtime::permission::BROWSER_IS_ACTIVE;
use ad_serving_core::runtime::permission::DO_NOT_DISTURB;
use ad_serving_core::runtime::permission::MINIMUM_WAIT_TIME;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Thursday 2026-01-01 12:00:00 UTC.
const NOON: Timestamp = Timestamp::from_unix_secs(1_767_268_800);

/// Returns a served notification ad record at `at`.
fn served_at(at: Timestamp) -> AdEventRecord {
    AdEventRecord {
        placement_id: PlacementId::new("placement"),
        campaign_id: CampaignId::new("campaign"),
        creative_set_id: CreativeSetId::new("set"),
        creative_instance_id: CreativeInstanceId::new("instance"),
        segment: Segment::new("technology"),
        ad_type: AdType::NotificationAd,
        event_type: AdEventType::Served,
        created_at: at,
    }
}

/// Evaluates the standard chain against the given inputs.
fn evaluate(
    state: &ClientState,
    params: &ServingParams,
    history: &dyn AdEventHistory,
    now: Timestamp,
) -> Result<ad_serving_core::PermissionReport, PermissionError> {
    let ctx = PermissionContext {
        state,
        params,
        history,
        now,
    };
    PermissionRules::notification_ads().evaluate(&ctx)
}

/// History that always fails.
struct UnavailableHistory;

impl AdEventHistory for UnavailableHistory {
    fn event_count(
        &self,
        _scope: &EventScope,
        _event_type: AdEventType,
        _since: Timestamp,
    ) -> Result<u64, HistoryError> {
        Err(HistoryError::Unavailable("offline".to_string()))
    }

    fn last_event_time(
        &self,
        _scope: &EventScope,
        _event_type: AdEventType,
    ) -> Result<Option<Timestamp>, HistoryError> {
        Err(HistoryError::Unavailable("offline".to_string()))
    }

    fn record_event(&self, _record: AdEventRecord) -> Result<(), HistoryError> {
        Err(HistoryError::Unavailable("offline".to_string()))
    }
}

/// Rule that counts evaluations and always allows.
struct CountingRule(Arc<AtomicUsize>);

impl PermissionRule for CountingRule {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn should_allow(
        &self,
        _ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(PermissionVerdict::Allow)
    }
}

/// Rule that always denies.
struct DenyRule;

impl PermissionRule for DenyRule {
    fn name(&self) -> &'static str {
        "deny"
    }

    fn should_allow(
        &self,
        _ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        Ok(PermissionVerdict::deny("always denied"))
    }
}

// ============================================================================
// SECTION: Chain Composition
// ============================================================================

/// Tests that the chain allows when every rule allows.
#[test]
fn all_rules_allow_by_default() {
    let history = InMemoryAdEventHistory::new();
    let report =
        evaluate(&ClientState::default(), &ServingParams::default(), &history, NOON).unwrap();
    assert!(report.should_allow());
    assert_eq!(report.last_message(), None);
}

/// Tests that the chain stops at the first denial.
#[test]
fn chain_short_circuits_on_first_denial() {
    let counter = Arc::new(AtomicUsize::new(0));
    let rules = PermissionRules::new(vec![
        Box::new(CountingRule(Arc::clone(&counter))),
        Box::new(DenyRule),
        Box::new(CountingRule(Arc::clone(&counter))),
    ]);
    let history = InMemoryAdEventHistory::new();
    let state = ClientState::default();
    let params = ServingParams::default();
    let ctx = PermissionContext {
        state: &state,
        params: &params,
        history: &history,
        now: NOON,
    };
    let report = rules.evaluate(&ctx).unwrap();
    assert!(!report.should_allow());
    assert_eq!(report.denied_by.as_deref(), Some("deny"));
    assert_eq!(report.last_message(), Some("always denied"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// Tests that a disabled rule always allows.
#[test]
fn disabled_rule_always_allows() {
    let history = InMemoryAdEventHistory::new();
    let state = ClientState {
        ads_enabled: false,
        ..ClientState::default()
    };
    let mut params = ServingParams::default();
    let denied = evaluate(&state, &params, &history, NOON).unwrap();
    assert_eq!(denied.denied_by.as_deref(), Some(ADS_ENABLED));

    params.permission.disabled.insert(ADS_ENABLED.to_string());
    let allowed = evaluate(&state, &params, &history, NOON).unwrap();
    assert!(allowed.should_allow());
}

/// Tests that history failures surface as errors.
#[test]
fn history_failure_is_reported() {
    let err = evaluate(&ClientState::default(), &ServingParams::default(), &UnavailableHistory, NOON)
        .unwrap_err();
    match err {
        PermissionError::History { rule, .. } => assert_eq!(rule, "ads_per_day"),
    }
}

// ============================================================================
// SECTION: Client Signals
// ============================================================================

/// Tests that an inactive browser denies on desktop but not on mobile.
#[test]
fn browser_must_be_active_on_desktop_only() {
    let history = InMemoryAdEventHistory::new();
    let params = ServingParams::default();
    let desktop = ClientState {
        browser_foreground: false,
        ..ClientState::default()
    };
    let report = evaluate(&desktop, &params, &history, NOON).unwrap();
    assert_eq!(report.denied_by.as_deref(), Some(BROWSER_IS_ACTIVE));

    let android = ClientState {
        platform: Platform::Android,
        ..desktop
    };
    assert!(evaluate(&android, &params, &history, NOON).unwrap().should_allow());
}

/// Tests that media playback and full screen deny.
#[test]
fn media_and_full_screen_deny() {
    let history = InMemoryAdEventHistory::new();
    let params = ServingParams::default();
    let media = ClientState {
        media_playing: true,
        ..ClientState::default()
    };
    assert_eq!(
        evaluate(&media, &params, &history, NOON).unwrap().denied_by.as_deref(),
        Some("media_playing")
    );
    let full_screen = ClientState {
        full_screen: true,
        ..ClientState::default()
    };
    assert_eq!(
        evaluate(&full_screen, &params, &history, NOON).unwrap().denied_by.as_deref(),
        Some("full_screen")
    );
}

/// Tests that quiet hours use the local offset and wrap past midnight.
#[test]
fn do_not_disturb_uses_local_time() {
    let history = InMemoryAdEventHistory::new();
    let mut params = ServingParams::default();
    params.permission.quiet_hours = Some(QuietHours {
        start_hour: 22,
        end_hour: 6,
    });
    let utc = ClientState::default();
    assert!(evaluate(&utc, &params, &history, NOON).unwrap().should_allow());

    // 12:00 UTC is 23:00 at UTC+11.
    let sydney = ClientState {
        utc_offset_minutes: 11 * 60,
        ..ClientState::default()
    };
    let report = evaluate(&sydney, &params, &history, NOON).unwrap();
    assert_eq!(report.denied_by.as_deref(), Some(DO_NOT_DISTURB));
}

// ============================================================================
// SECTION: History Rules
// ============================================================================

/// Tests that the hourly cap counts only serves inside the rolling hour.
#[test]
fn ads_per_hour_uses_rolling_window() {
    let history = InMemoryAdEventHistory::new();
    let mut params = ServingParams::default();
    params.permission.ads_per_hour = 2;
    params.permission.minimum_wait_time_secs = 0;
    let hour = Duration::from_secs(3_600);
    history.record_event(served_at(NOON.saturating_sub(hour))).unwrap();
    history.record_event(served_at(NOON.saturating_sub(Duration::from_secs(600)))).unwrap();
    assert!(evaluate(&ClientState::default(), &params, &history, NOON).unwrap().should_allow());

    history.record_event(served_at(NOON.saturating_sub(Duration::from_secs(60)))).unwrap();
    let report = evaluate(&ClientState::default(), &params, &history, NOON).unwrap();
    assert_eq!(report.denied_by.as_deref(), Some(ADS_PER_HOUR));
}

/// Tests that a zero cap serves no ads, even with an empty history.
#[test]
fn zero_caps_deny_every_opportunity() {
    let history = InMemoryAdEventHistory::new();
    let mut params = ServingParams::default();
    params.permission.ads_per_hour = 0;
    let report = evaluate(&ClientState::default(), &params, &history, NOON).unwrap();
    assert_eq!(report.denied_by.as_deref(), Some(ADS_PER_HOUR));

    params.permission.ads_per_hour = 2;
    params.permission.ads_per_day = 0;
    let report = evaluate(&ClientState::default(), &params, &history, NOON).unwrap();
    assert_eq!(report.denied_by.as_deref(), Some(ADS_PER_DAY));
}

/// Tests that the minimum wait time is measured from the last serve.
#[test]
fn minimum_wait_time_since_last_serve() {
    let history = InMemoryAdEventHistory::new();
    let params = ServingParams::default();
    history.record_event(served_at(NOON.saturating_sub(Duration::from_secs(120)))).unwrap();
    let report = evaluate(&ClientState::default(), &params, &history, NOON).unwrap();
    assert_eq!(report.denied_by.as_deref(), Some(MINIMUM_WAIT_TIME));

    let later = NOON.saturating_add(Duration::from_secs(180));
    assert!(evaluate(&ClientState::default(), &params, &history, later).unwrap().should_allow());
}
