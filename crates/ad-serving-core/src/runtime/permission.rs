// crates/ad-serving-core/src/runtime/permission.rs
// ============================================================================
// Module: Ad Serving Permission Rules
// Description: Global admission gates evaluated before candidate retrieval.
// Purpose: Decide whether any ad may be served for the current context.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! Permission rules read only process-wide signals: the client state, the
//! serving parameters, the decision time, and aggregate ad history. The
//! [`PermissionRules`] chain ANDs its rules and stops at the first denial.
//! A rule named in the disabled set always allows.
//!
//! History lookups that fail deny the opportunity and surface as
//! [`PermissionError`] so the orchestrator can report missing data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdEventType;
use crate::core::AdType;
use crate::core::ClientState;
use crate::core::ServingParams;
use crate::core::Timestamp;
use crate::interfaces::AdEventHistory;
use crate::interfaces::EventScope;
use crate::interfaces::HistoryError;

// ============================================================================
// SECTION: Rule Names
// ============================================================================

/// User opt-in rule name.
pub const ADS_ENABLED: &str = "ads_enabled";
/// Browser active rule name.
pub const BROWSER_IS_ACTIVE: &str = "browser_is_active";
/// Do-not-disturb rule name.
pub const DO_NOT_DISTURB: &str = "do_not_disturb";
/// Media playing rule name.
pub const MEDIA_PLAYING: &str = "media_playing";
/// Full-screen rule name.
pub const FULL_SCREEN: &str = "full_screen";
/// Hourly cap rule name.
pub const ADS_PER_HOUR: &str = "ads_per_hour";
/// Daily cap rule name.
pub const ADS_PER_DAY: &str = "ads_per_day";
/// Minimum wait time rule name.
pub const MINIMUM_WAIT_TIME: &str = "minimum_wait_time";

/// One hour.
const HOUR: Duration = Duration::from_secs(3_600);
/// One day.
const DAY: Duration = Duration::from_secs(86_400);

// ============================================================================
// SECTION: Rule Contract
// ============================================================================

/// Inputs available to permission rules.
#[derive(Clone, Copy)]
pub struct PermissionContext<'a> {
    /// Client state snapshot.
    pub state: &'a ClientState,
    /// Parameter snapshot.
    pub params: &'a ServingParams,
    /// Aggregate ad history.
    pub history: &'a dyn AdEventHistory,
    /// Decision time.
    pub now: Timestamp,
}

/// Verdict of a single permission rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PermissionVerdict {
    /// Serving may proceed.
    Allow,
    /// Serving is denied.
    Deny {
        /// Human-readable denial reason.
        message: String,
    },
}

impl PermissionVerdict {
    /// Builds a denial.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
        }
    }

    /// Returns true for [`PermissionVerdict::Allow`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Global admission gate.
pub trait PermissionRule: Send + Sync {
    /// Returns the stable rule name used by configuration.
    fn name(&self) -> &'static str;

    /// Decides whether serving is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the rule needs history that is unavailable.
    fn should_allow(&self, ctx: &PermissionContext<'_>)
    -> Result<PermissionVerdict, HistoryError>;
}

// ============================================================================
// SECTION: Chain
// ============================================================================

/// Permission chain errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A rule could not read the history it needs.
    #[error("permission rule {rule} could not read history: {source}")]
    History {
        /// Rule that failed.
        rule: &'static str,
        /// Underlying history error.
        #[source]
        source: HistoryError,
    },
}

/// Outcome of a permission chain evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionReport {
    /// Rule that denied, if any.
    pub denied_by: Option<String>,
    /// Denial message, if any.
    pub message: Option<String>,
}

impl PermissionReport {
    /// Returns true when every enabled rule allowed.
    #[must_use]
    pub const fn should_allow(&self) -> bool {
        self.denied_by.is_none()
    }

    /// Returns the most recent denial message.
    #[must_use]
    pub fn last_message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Ordered AND-composition of permission rules.
pub struct PermissionRules {
    /// Rules in evaluation order.
    rules: Vec<Box<dyn PermissionRule>>,
}

impl PermissionRules {
    /// Creates a chain from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<Box<dyn PermissionRule>>) -> Self {
        Self { rules }
    }

    /// Creates the standard notification ad chain.
    #[must_use]
    pub fn notification_ads() -> Self {
        Self::new(vec![
            Box::new(AdsEnabledPermissionRule),
            Box::new(BrowserIsActivePermissionRule),
            Box::new(FullScreenPermissionRule),
            Box::new(MediaPlayingPermissionRule),
            Box::new(DoNotDisturbPermissionRule),
            Box::new(AdsPerDayPermissionRule),
            Box::new(AdsPerHourPermissionRule),
            Box::new(MinimumWaitTimePermissionRule),
        ])
    }

    /// Returns the rule names in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Evaluates the chain, stopping at the first denial.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when a rule cannot read history.
    pub fn evaluate(&self, ctx: &PermissionContext<'_>) -> Result<PermissionReport, PermissionError> {
        for rule in &self.rules {
            if ctx.params.permission.disabled.contains(rule.name()) {
                continue;
            }
            let verdict = rule
                .should_allow(ctx)
                .map_err(|source| PermissionError::History { rule: rule.name(), source })?;
            if let PermissionVerdict::Deny { message } = verdict {
                return Ok(PermissionReport {
                    denied_by: Some(rule.name().to_string()),
                    message: Some(message),
                });
            }
        }
        Ok(PermissionReport {
            denied_by: None,
            message: None,
        })
    }
}

// ============================================================================
// SECTION: Client Signal Rules
// ============================================================================

/// Denies when the user has not opted in to ads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdsEnabledPermissionRule;

impl PermissionRule for AdsEnabledPermissionRule {
    fn name(&self) -> &'static str {
        ADS_ENABLED
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        if ctx.state.ads_enabled {
            Ok(PermissionVerdict::Allow)
        } else {
            Ok(PermissionVerdict::deny("User has not opted in to ads"))
        }
    }
}

/// Denies on desktop unless the browser window is active and in the foreground.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserIsActivePermissionRule;

impl PermissionRule for BrowserIsActivePermissionRule {
    fn name(&self) -> &'static str {
        BROWSER_IS_ACTIVE
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        if ctx.state.platform.is_mobile()
            || (ctx.state.browser_active && ctx.state.browser_foreground)
        {
            Ok(PermissionVerdict::Allow)
        } else {
            Ok(PermissionVerdict::deny("Browser window is not active"))
        }
    }
}

/// Denies on desktop while the browser is full screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullScreenPermissionRule;

impl PermissionRule for FullScreenPermissionRule {
    fn name(&self) -> &'static str {
        FULL_SCREEN
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        if ctx.state.platform.is_mobile() || !ctx.state.full_screen {
            Ok(PermissionVerdict::Allow)
        } else {
            Ok(PermissionVerdict::deny("Full screen mode"))
        }
    }
}

/// Denies while media is playing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaPlayingPermissionRule;

impl PermissionRule for MediaPlayingPermissionRule {
    fn name(&self) -> &'static str {
        MEDIA_PLAYING
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        if ctx.state.media_playing {
            Ok(PermissionVerdict::deny("Media is currently playing"))
        } else {
            Ok(PermissionVerdict::Allow)
        }
    }
}

/// Denies during the configured local quiet hours.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNotDisturbPermissionRule;

impl PermissionRule for DoNotDisturbPermissionRule {
    fn name(&self) -> &'static str {
        DO_NOT_DISTURB
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        let Some(quiet_hours) = ctx.params.permission.quiet_hours else {
            return Ok(PermissionVerdict::Allow);
        };
        let Some(local) = ctx.now.to_local(ctx.state.utc_offset_minutes) else {
            return Ok(PermissionVerdict::deny("Local time is unavailable"));
        };
        if quiet_hours.contains(local.hour()) {
            Ok(PermissionVerdict::deny("Should not disturb"))
        } else {
            Ok(PermissionVerdict::Allow)
        }
    }
}

// ============================================================================
// SECTION: History Rules
// ============================================================================

/// Scope shared by the serve-rate rules.
const NOTIFICATION_AD_SCOPE: EventScope = EventScope::AdType(AdType::NotificationAd);

/// Denies when served notification ads in the last hour reach the cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdsPerHourPermissionRule;

impl PermissionRule for AdsPerHourPermissionRule {
    fn name(&self) -> &'static str {
        ADS_PER_HOUR
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        let cap = ctx.params.permission.ads_per_hour;
        let served = ctx.history.event_count(
            &NOTIFICATION_AD_SCOPE,
            AdEventType::Served,
            ctx.now.saturating_sub(HOUR),
        )?;
        if served >= u64::from(cap) {
            Ok(PermissionVerdict::deny("You have exceeded the allowed ads per hour"))
        } else {
            Ok(PermissionVerdict::Allow)
        }
    }
}

/// Denies when served notification ads in the last day reach the cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdsPerDayPermissionRule;

impl PermissionRule for AdsPerDayPermissionRule {
    fn name(&self) -> &'static str {
        ADS_PER_DAY
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        let cap = ctx.params.permission.ads_per_day;
        let served = ctx.history.event_count(
            &NOTIFICATION_AD_SCOPE,
            AdEventType::Served,
            ctx.now.saturating_sub(DAY),
        )?;
        if served >= u64::from(cap) {
            Ok(PermissionVerdict::deny("You have exceeded the allowed ads per day"))
        } else {
            Ok(PermissionVerdict::Allow)
        }
    }
}

/// Denies when the last served notification ad is younger than the wait time.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumWaitTimePermissionRule;

impl PermissionRule for MinimumWaitTimePermissionRule {
    fn name(&self) -> &'static str {
        MINIMUM_WAIT_TIME
    }

    fn should_allow(
        &self,
        ctx: &PermissionContext<'_>,
    ) -> Result<PermissionVerdict, HistoryError> {
        let wait = Duration::from_secs(ctx.params.permission.minimum_wait_time_secs);
        let last = ctx.history.last_event_time(&NOTIFICATION_AD_SCOPE, AdEventType::Served)?;
        match last {
            Some(last) if ctx.now.duration_since(last) < wait => Ok(PermissionVerdict::deny(
                "Ad cannot be shown as minimum wait time has not passed",
            )),
            _ => Ok(PermissionVerdict::Allow),
        }
    }
}
