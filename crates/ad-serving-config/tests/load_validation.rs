//! Config load and validation tests for ad-serving-config.
// crates/ad-serving-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and section range checks.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

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

use std::io::Write;
use std::path::Path;

use ad_serving_config::AdServingConfig;
use ad_serving_config::AuditSinkKind;
use ad_serving_config::ConfigError;
use ad_serving_core::AdType;
use ad_serving_core::CreativeSetId;
use ad_serving_core::QuietHours;
use ad_serving_core::ServingParams;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

/// Assert that a load result is an error containing a specific substring.
fn assert_invalid(result: Result<AdServingConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

/// Writes `content` to a temporary file.
fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

// ============================================================================
// SECTION: Load Guards
// ============================================================================

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(AdServingConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        AdServingConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(AdServingConfig::load(Some(&path)), "config io error")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; 1_048_577])?;
    assert_invalid(AdServingConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(AdServingConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config(b"[pacing]\nthreshold = 0.5\nturbo = true\n")?;
    assert_invalid(AdServingConfig::load(Some(file.path())), "config parse error")
}

// ============================================================================
// SECTION: Defaults and Conversion
// ============================================================================

#[test]
fn empty_file_yields_default_params() -> TestResult {
    let file = write_config(b"")?;
    let config = AdServingConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.serving_params() != ServingParams::default() {
        return Err("empty config should match default serving params".to_string());
    }
    if config.audit.sink != AuditSinkKind::None {
        return Err("audit sink should default to none".to_string());
    }
    Ok(())
}

#[test]
fn full_config_converts_to_serving_params() -> TestResult {
    let file = write_config(
        br#"
[permission]
disabled_rules = ["media_playing"]
ads_per_hour = 4
ads_per_day = 20
minimum_wait_time_secs = 60
quiet_hours = { start_hour = 22, end_hour = 7 }

[exclusion]
disabled_rules = ["daypart", "per_week"]
dismissed_window_secs = 3600
dismissed_cap = 1
min_embedding_similarity = 0.25
anti_targeting = { "creative-set-1" = ["competitor.example"] }

[pacing]
threshold = 0.75

[bandit]
epsilon = 0.1

[events]
click_from_served_ad_types = ["inline_content_ad"]

[redemption]
anonymous_host = "https://confirm.example"
anonymous_search_host = "https://search.confirm.example"
base_backoff_secs = 30
max_backoff_secs = 600
max_attempts = 3
"#,
    )?;
    let config = AdServingConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let params = config.serving_params();
    if !params.permission.disabled.contains("media_playing") || params.permission.ads_per_hour != 4 {
        return Err(format!("unexpected permission params: {:?}", params.permission));
    }
    if params.permission.quiet_hours != Some(QuietHours { start_hour: 22, end_hour: 7 }) {
        return Err("quiet hours not converted".to_string());
    }
    let anti = params.exclusion.anti_targeting.get(&CreativeSetId::new("creative-set-1"));
    if !anti.is_some_and(|sites| sites.contains("competitor.example")) {
        return Err("anti targeting not converted".to_string());
    }
    if params.exclusion.dismissed_cap != 1 || params.exclusion.min_embedding_similarity != Some(0.25)
    {
        return Err(format!("unexpected exclusion params: {:?}", params.exclusion));
    }
    if (params.pacing.threshold - 0.75).abs() > f64::EPSILON
        || (params.bandit.epsilon - 0.1).abs() > f64::EPSILON
    {
        return Err("pacing or bandit params not converted".to_string());
    }
    if !params.events.allows_click_from_served(AdType::InlineContentAd)
        || params.events.allows_click_from_served(AdType::NotificationAd)
    {
        return Err("click-from-served policy not converted".to_string());
    }
    if params.redemption.anonymous_host != "https://confirm.example"
        || params.redemption.max_attempts != 3
    {
        return Err(format!("unexpected redemption params: {:?}", params.redemption));
    }
    Ok(())
}

// ============================================================================
// SECTION: Range Validation
// ============================================================================

#[test]
fn epsilon_outside_unit_interval_is_rejected() -> TestResult {
    assert_invalid(AdServingConfig::from_toml_str("[bandit]\nepsilon = 1.5\n"), "bandit.epsilon")?;
    assert_invalid(AdServingConfig::from_toml_str("[bandit]\nepsilon = -0.1\n"), "bandit.epsilon")
}

#[test]
fn pacing_threshold_outside_unit_interval_is_rejected() -> TestResult {
    assert_invalid(
        AdServingConfig::from_toml_str("[pacing]\nthreshold = 2.0\n"),
        "pacing.threshold",
    )?;
    assert_invalid(AdServingConfig::from_toml_str("[pacing]\nthreshold = nan\n"), "pacing.threshold")
}

#[test]
fn unknown_disabled_rule_is_rejected() -> TestResult {
    assert_invalid(
        AdServingConfig::from_toml_str("[permission]\ndisabled_rules = [\"weather\"]\n"),
        "unknown rule weather",
    )?;
    assert_invalid(
        AdServingConfig::from_toml_str("[exclusion]\ndisabled_rules = [\"ads_per_hour\"]\n"),
        "unknown rule ads_per_hour",
    )
}

#[test]
fn hourly_cap_above_daily_cap_is_rejected() -> TestResult {
    assert_invalid(
        AdServingConfig::from_toml_str("[permission]\nads_per_hour = 50\nads_per_day = 10\n"),
        "ads_per_hour must not exceed",
    )
}

#[test]
fn zero_hourly_cap_is_kept_and_caps_daily_cap() -> TestResult {
    let config = AdServingConfig::from_toml_str("[permission]\nads_per_hour = 0\n")
        .map_err(|err| err.to_string())?;
    if config.serving_params().permission.ads_per_hour != 0 {
        return Err("zero hourly cap not converted".to_string());
    }
    assert_invalid(
        AdServingConfig::from_toml_str("[permission]\nads_per_hour = 2\nads_per_day = 0\n"),
        "ads_per_hour must not exceed",
    )
}

#[test]
fn quiet_hours_out_of_range_are_rejected() -> TestResult {
    assert_invalid(
        AdServingConfig::from_toml_str(
            "[permission]\nquiet_hours = { start_hour = 24, end_hour = 6 }\n",
        ),
        "quiet_hours hours",
    )
}

#[test]
fn plain_http_host_requires_opt_in() -> TestResult {
    let plain = "[redemption]\nanonymous_host = \"http://127.0.0.1:8080\"\n";
    assert_invalid(AdServingConfig::from_toml_str(plain), "must use https")?;
    let allowed = format!("{plain}allow_http = true\n");
    AdServingConfig::from_toml_str(&allowed).map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn host_with_query_is_rejected() -> TestResult {
    assert_invalid(
        AdServingConfig::from_toml_str("[redemption]\nanonymous_host = \"https://a.example?x=1\"\n"),
        "bare base url",
    )
}

#[test]
fn redemption_limits_are_enforced() -> TestResult {
    assert_invalid(
        AdServingConfig::from_toml_str("[redemption]\nmax_attempts = 0\n"),
        "redemption.max_attempts",
    )?;
    assert_invalid(
        AdServingConfig::from_toml_str("[redemption]\nbase_backoff_secs = 0\n"),
        "redemption.base_backoff_secs",
    )?;
    assert_invalid(
        AdServingConfig::from_toml_str("[redemption]\nbase_backoff_secs = 120\nmax_backoff_secs = 60\n"),
        "redemption.max_backoff_secs",
    )?;
    assert_invalid(
        AdServingConfig::from_toml_str("[redemption]\ntimeout_ms = 5\n"),
        "redemption.timeout_ms",
    )
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

#[test]
fn file_sink_requires_path() -> TestResult {
    assert_invalid(AdServingConfig::from_toml_str("[audit]\nsink = \"file\"\n"), "audit.path is required")?;
    assert_invalid(
        AdServingConfig::from_toml_str("[audit]\nsink = \"stderr\"\npath = \"audit.jsonl\"\n"),
        "only valid for the file sink",
    )
}

#[test]
fn file_sink_builds_and_creates_file() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("audit.jsonl");
    let text = format!("[audit]\nsink = \"file\"\npath = {:?}\n", path.display().to_string());
    let config = AdServingConfig::from_toml_str(&text).map_err(|err| err.to_string())?;
    config.audit.build_sink().map_err(|err| err.to_string())?;
    if !path.exists() {
        return Err("audit file was not created".to_string());
    }
    Ok(())
}
