// crates/ad-serving-config/src/config.rs
// ============================================================================
// Module: Ad Serving Configuration
// Description: Configuration loading and validation for the ad serving core.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: ad-serving-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section rejects unknown keys and falls back to defaults when absent.
//! [`AdServingConfig::serving_params`] converts a validated configuration
//! into the [`ServingParams`] the pipeline reads at evaluation time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use ad_serving_core::AdType;
use ad_serving_core::AuditSink;
use ad_serving_core::BanditParams;
use ad_serving_core::CreativeSetId;
use ad_serving_core::EventParams;
use ad_serving_core::ExclusionParams;
use ad_serving_core::ExclusionRules;
use ad_serving_core::FileAuditSink;
use ad_serving_core::NoopAuditSink;
use ad_serving_core::PacingParams;
use ad_serving_core::PermissionParams;
use ad_serving_core::PermissionRules;
use ad_serving_core::QuietHours;
use ad_serving_core::RedemptionParams;
use ad_serving_core::ServingParams;
use ad_serving_core::StderrAuditSink;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "ad-serving.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "AD_SERVING_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of anti-targeted creative sets.
pub(crate) const MAX_ANTI_TARGETING_ENTRIES: usize = 1_024;
/// Maximum retry backoff accepted, in seconds (one day).
pub(crate) const MAX_BACKOFF_SECS: u64 = 86_400;
/// Maximum redemption attempts accepted.
pub(crate) const MAX_REDEMPTION_ATTEMPTS: u32 = 32;
/// Minimum HTTP timeout in milliseconds.
pub(crate) const MIN_TIMEOUT_MS: u64 = 100;
/// Maximum HTTP timeout in milliseconds.
pub(crate) const MAX_TIMEOUT_MS: u64 = 60_000;
/// Maximum accepted confirmation response body in bytes.
pub(crate) const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Ad serving configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdServingConfig {
    /// Permission rule configuration.
    #[serde(default)]
    pub permission: PermissionConfig,
    /// Exclusion rule configuration.
    #[serde(default)]
    pub exclusion: ExclusionConfig,
    /// Pacing configuration.
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Bandit configuration.
    #[serde(default)]
    pub bandit: BanditConfig,
    /// Lifecycle event configuration.
    #[serde(default)]
    pub events: EventsConfig,
    /// Confirmation redemption configuration.
    #[serde(default)]
    pub redemption: RedemptionConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AdServingConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is `path` when given, else the `AD_SERVING_CONFIG`
    /// environment variable, else `ad-serving.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.permission.validate()?;
        self.exclusion.validate()?;
        self.pacing.validate()?;
        self.bandit.validate()?;
        self.redemption.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Converts the configuration into serving parameters.
    #[must_use]
    pub fn serving_params(&self) -> ServingParams {
        ServingParams {
            permission: self.permission.to_params(),
            exclusion: self.exclusion.to_params(),
            pacing: PacingParams {
                threshold: self.pacing.threshold,
            },
            bandit: BanditParams {
                epsilon: self.bandit.epsilon,
            },
            events: EventParams {
                click_from_served_ad_types: self.events.click_from_served_ad_types.clone(),
            },
            redemption: self.redemption.to_params(),
        }
    }
}

// ============================================================================
// SECTION: Permission
// ============================================================================

/// Permission rule configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionConfig {
    /// Rule names that always allow.
    pub disabled_rules: BTreeSet<String>,
    /// Maximum notification ads per rolling hour; zero serves no ads.
    pub ads_per_hour: u32,
    /// Maximum notification ads per rolling day; zero serves no ads.
    pub ads_per_day: u32,
    /// Minimum seconds between served notification ads.
    pub minimum_wait_time_secs: u64,
    /// Optional local quiet hours.
    pub quiet_hours: Option<QuietHoursConfig>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        let defaults = PermissionParams::default();
        Self {
            disabled_rules: BTreeSet::new(),
            ads_per_hour: defaults.ads_per_hour,
            ads_per_day: defaults.ads_per_day,
            minimum_wait_time_secs: defaults.minimum_wait_time_secs,
            quiet_hours: None,
        }
    }
}

impl PermissionConfig {
    /// Validates permission settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let known = PermissionRules::notification_ads().rule_names();
        validate_rule_names("permission", &self.disabled_rules, &known)?;
        if self.ads_per_hour > self.ads_per_day {
            return Err(ConfigError::Invalid(
                "permission.ads_per_hour must not exceed permission.ads_per_day".to_string(),
            ));
        }
        if let Some(quiet_hours) = &self.quiet_hours {
            quiet_hours.validate()?;
        }
        Ok(())
    }

    /// Converts into core parameters.
    fn to_params(&self) -> PermissionParams {
        PermissionParams {
            disabled: self.disabled_rules.clone(),
            ads_per_hour: self.ads_per_hour,
            ads_per_day: self.ads_per_day,
            minimum_wait_time_secs: self.minimum_wait_time_secs,
            quiet_hours: self.quiet_hours.map(|window| QuietHours {
                start_hour: window.start_hour,
                end_hour: window.end_hour,
            }),
        }
    }
}

/// Local quiet-hours window.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuietHoursConfig {
    /// First quiet hour (inclusive), `0..24`.
    pub start_hour: u8,
    /// Hour at which serving resumes (exclusive), `0..24`.
    pub end_hour: u8,
}

impl QuietHoursConfig {
    /// Validates the hour range.
    fn validate(self) -> Result<(), ConfigError> {
        if self.start_hour >= 24 || self.end_hour >= 24 {
            return Err(ConfigError::Invalid(
                "permission.quiet_hours hours must be in 0..24".to_string(),
            ));
        }
        if self.start_hour == self.end_hour {
            return Err(ConfigError::Invalid(
                "permission.quiet_hours window must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Exclusion
// ============================================================================

/// Exclusion rule configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExclusionConfig {
    /// Rule names that never exclude.
    pub disabled_rules: BTreeSet<String>,
    /// Rolling window for counting dismissals, in seconds.
    pub dismissed_window_secs: u64,
    /// Dismissals within the window that exclude a creative set.
    pub dismissed_cap: u32,
    /// Minimum cosine similarity between page and candidate embeddings.
    pub min_embedding_similarity: Option<f64>,
    /// Sites that anti-target each creative set, keyed by creative set id.
    pub anti_targeting: BTreeMap<String, BTreeSet<String>>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        let defaults = ExclusionParams::default();
        Self {
            disabled_rules: BTreeSet::new(),
            dismissed_window_secs: defaults.dismissed_window_secs,
            dismissed_cap: defaults.dismissed_cap,
            min_embedding_similarity: defaults.min_embedding_similarity,
            anti_targeting: BTreeMap::new(),
        }
    }
}

impl ExclusionConfig {
    /// Validates exclusion settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let known = ExclusionRules::notification_ads().rule_names();
        validate_rule_names("exclusion", &self.disabled_rules, &known)?;
        if self.dismissed_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "exclusion.dismissed_window_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(similarity) = self.min_embedding_similarity
            && !(-1.0..=1.0).contains(&similarity)
        {
            return Err(ConfigError::Invalid(
                "exclusion.min_embedding_similarity must be in [-1, 1]".to_string(),
            ));
        }
        if self.anti_targeting.len() > MAX_ANTI_TARGETING_ENTRIES {
            return Err(ConfigError::Invalid("exclusion.anti_targeting has too many entries".to_string()));
        }
        for (creative_set_id, sites) in &self.anti_targeting {
            if creative_set_id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "exclusion.anti_targeting keys must be non-empty".to_string(),
                ));
            }
            if sites.iter().any(|site| site.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "exclusion.anti_targeting.{creative_set_id} contains an empty site"
                )));
            }
        }
        Ok(())
    }

    /// Converts into core parameters.
    fn to_params(&self) -> ExclusionParams {
        ExclusionParams {
            disabled: self.disabled_rules.clone(),
            dismissed_window_secs: self.dismissed_window_secs,
            dismissed_cap: self.dismissed_cap,
            min_embedding_similarity: self.min_embedding_similarity,
            anti_targeting: self
                .anti_targeting
                .iter()
                .map(|(id, sites)| (CreativeSetId::new(id.as_str()), sites.clone()))
                .collect(),
        }
    }
}

// ============================================================================
// SECTION: Pacing and Bandit
// ============================================================================

/// Pacing configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingConfig {
    /// Pass-level admission threshold in `[0, 1]`.
    pub threshold: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            threshold: PacingParams::default().threshold,
        }
    }
}

impl PacingConfig {
    /// Validates the threshold range.
    fn validate(self) -> Result<(), ConfigError> {
        validate_unit_interval("pacing.threshold", self.threshold)
    }
}

/// Bandit configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BanditConfig {
    /// Exploration probability in `[0, 1]`.
    pub epsilon: f64,
    /// Optional JSON file persisting arm statistics; in-memory when absent.
    pub arm_store_path: Option<PathBuf>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            epsilon: BanditParams::default().epsilon,
            arm_store_path: None,
        }
    }
}

impl BanditConfig {
    /// Validates the epsilon range and store path.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_unit_interval("bandit.epsilon", self.epsilon)?;
        if let Some(path) = &self.arm_store_path {
            validate_path(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Lifecycle event configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Ad types whose ads may be clicked without a prior view.
    pub click_from_served_ad_types: BTreeSet<AdType>,
}

// ============================================================================
// SECTION: Redemption
// ============================================================================

/// Confirmation redemption configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedemptionConfig {
    /// Base URL of the anonymous confirmation host.
    pub anonymous_host: String,
    /// Base URL of the anonymous search confirmation host.
    pub anonymous_search_host: String,
    /// Initial retry backoff in seconds.
    pub base_backoff_secs: u64,
    /// Maximum retry backoff in seconds.
    pub max_backoff_secs: u64,
    /// Attempts before a retryable failure is abandoned.
    pub max_attempts: u32,
    /// HTTP request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum accepted response body in bytes.
    pub max_response_bytes: usize,
    /// Allow plain `http://` hosts (local testing only).
    pub allow_http: bool,
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        let defaults = RedemptionParams::default();
        Self {
            anonymous_host: defaults.anonymous_host,
            anonymous_search_host: defaults.anonymous_search_host,
            base_backoff_secs: defaults.base_backoff_secs,
            max_backoff_secs: defaults.max_backoff_secs,
            max_attempts: defaults.max_attempts,
            timeout_ms: 10_000,
            max_response_bytes: 64 * 1024,
            allow_http: false,
        }
    }
}

impl RedemptionConfig {
    /// Validates hosts, backoff, and transport limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_host("redemption.anonymous_host", &self.anonymous_host, self.allow_http)?;
        validate_host(
            "redemption.anonymous_search_host",
            &self.anonymous_search_host,
            self.allow_http,
        )?;
        if self.base_backoff_secs == 0 {
            return Err(ConfigError::Invalid(
                "redemption.base_backoff_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff_secs < self.base_backoff_secs || self.max_backoff_secs > MAX_BACKOFF_SECS {
            return Err(ConfigError::Invalid(
                "redemption.max_backoff_secs must be between base_backoff_secs and one day"
                    .to_string(),
            ));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_REDEMPTION_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "redemption.max_attempts must be between 1 and {MAX_REDEMPTION_ATTEMPTS}"
            )));
        }
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "redemption.timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"
            )));
        }
        if self.max_response_bytes == 0 || self.max_response_bytes > MAX_RESPONSE_BYTES {
            return Err(ConfigError::Invalid(
                "redemption.max_response_bytes must be between 1 and 1 MiB".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts into core parameters.
    fn to_params(&self) -> RedemptionParams {
        RedemptionParams {
            anonymous_host: self.anonymous_host.clone(),
            anonymous_search_host: self.anonymous_search_host.clone(),
            base_backoff_secs: self.base_backoff_secs,
            max_backoff_secs: self.max_backoff_secs,
            max_attempts: self.max_attempts,
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Discard audit events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    pub sink: AuditSinkKind,
    /// Output path for the file sink.
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates that the file sink has a path.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
            (AuditSinkKind::File, Some(path)) => validate_path(path),
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::None, _) => Ok(Arc::new(NoopAuditSink)),
            (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkKind::File, Some(path)) => {
                let sink = FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument, environment, or default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("config path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Rejects disabled rule names that no chain defines.
fn validate_rule_names(
    section: &str,
    disabled: &BTreeSet<String>,
    known: &[&'static str],
) -> Result<(), ConfigError> {
    for name in disabled {
        if !known.contains(&name.as_str()) {
            return Err(ConfigError::Invalid(format!("{section}.disabled_rules: unknown rule {name}")));
        }
    }
    Ok(())
}

/// Requires a finite value in `[0, 1]`.
fn validate_unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{field} must be in [0, 1]")))
    }
}

/// Requires an absolute `https://` base URL (or `http://` when allowed).
fn validate_host(field: &str, value: &str, allow_http: bool) -> Result<(), ConfigError> {
    let rest = if let Some(rest) = value.strip_prefix("https://") {
        rest
    } else if let Some(rest) = value.strip_prefix("http://") {
        if !allow_http {
            return Err(ConfigError::Invalid(format!("{field} must use https")));
        }
        rest
    } else {
        return Err(ConfigError::Invalid(format!("{field} must be an absolute http(s) url")));
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() || value.chars().any(char::is_whitespace) || value.contains(['?', '#']) {
        return Err(ConfigError::Invalid(format!("{field} must be a bare base url")));
    }
    Ok(())
}
