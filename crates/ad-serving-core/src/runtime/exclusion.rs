// crates/ad-serving-core/src/runtime/exclusion.rs
// ============================================================================
// Module: Ad Serving Exclusion Rules
// Description: Per-candidate disqualification rules and the filter chain.
// Purpose: Remove candidates that must never reach bandit selection.
// Dependencies: crate::{core, interfaces}, serde, thiserror
// ============================================================================

//! ## Overview
//! Each [`ExclusionRule`] reports a stable identity key for a candidate and
//! decides whether to exclude it. The [`ExclusionRules`] chain keeps a
//! candidate only if no enabled rule excludes it and records the first
//! excluding rule for every dropped candidate.
//!
//! Rules are pure reads of the candidate, the client snapshot, the parameter
//! snapshot, and the event history. Every candidate is evaluated on its own;
//! the uuid identifies the exclusion target but never stands in for the
//! candidate's other attributes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdEventType;
use crate::core::Candidate;
use crate::core::ClientState;
use crate::core::CreativeInstanceId;
use crate::core::ServingParams;
use crate::core::Timestamp;
use crate::interfaces::AdEventHistory;
use crate::interfaces::EventScope;
use crate::interfaces::HistoryError;

// ============================================================================
// SECTION: Rule Names
// ============================================================================

/// Inappropriate-flag rule name.
pub const MARKED_AS_INAPPROPRIATE: &str = "marked_as_inappropriate";
/// Disliked-segment rule name.
pub const MARKED_TO_NO_LONGER_RECEIVE: &str = "marked_to_no_longer_receive";
/// Dismissal rule name.
pub const DISMISSED: &str = "dismissed";
/// Regional targeting rule name.
pub const SUBDIVISION_TARGETING: &str = "subdivision_targeting";
/// Anti-targeting rule name.
pub const ANTI_TARGETING: &str = "anti_targeting";
/// Daypart rule name.
pub const DAYPART: &str = "daypart";
/// Embedding similarity rule name.
pub const EMBEDDING_SIMILARITY: &str = "embedding_similarity";

// ============================================================================
// SECTION: Rule Contract
// ============================================================================

/// Inputs available to exclusion rules.
#[derive(Clone, Copy)]
pub struct ExclusionContext<'a> {
    /// Client state snapshot.
    pub state: &'a ClientState,
    /// Parameter snapshot.
    pub params: &'a ServingParams,
    /// Ad event history.
    pub history: &'a dyn AdEventHistory,
    /// Decision time.
    pub now: Timestamp,
}

/// Verdict of a single exclusion rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ExclusionVerdict {
    /// Candidate stays eligible.
    Include,
    /// Candidate is excluded.
    Exclude {
        /// Human-readable exclusion reason.
        message: String,
    },
}

impl ExclusionVerdict {
    /// Builds an exclusion.
    #[must_use]
    pub fn exclude(message: impl Into<String>) -> Self {
        Self::Exclude {
            message: message.into(),
        }
    }

    /// Returns true for [`ExclusionVerdict::Exclude`].
    #[must_use]
    pub const fn is_excluded(&self) -> bool {
        matches!(self, Self::Exclude { .. })
    }
}

/// Per-candidate disqualification check.
pub trait ExclusionRule: Send + Sync {
    /// Returns the stable rule name used by configuration.
    fn name(&self) -> &'static str;

    /// Returns the key identifying the cap or state evaluated for `candidate`.
    fn uuid(&self, candidate: &Candidate) -> String;

    /// Decides whether `candidate` is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the rule needs history that is unavailable.
    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError>;
}

// ============================================================================
// SECTION: Chain
// ============================================================================

/// Exclusion chain errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ExclusionError {
    /// A rule could not read the history it needs.
    #[error("exclusion rule {rule} could not read history: {source}")]
    History {
        /// Rule that failed.
        rule: &'static str,
        /// Underlying history error.
        #[source]
        source: HistoryError,
    },
}

/// Record of a candidate dropped by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRecord {
    /// Excluded creative instance.
    pub creative_instance_id: CreativeInstanceId,
    /// Rule that excluded it.
    pub rule: String,
    /// Rule key for the candidate.
    pub uuid: String,
    /// Exclusion message.
    pub message: String,
}

/// Candidates partitioned by the chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterResult {
    /// Candidates no rule excluded, in input order.
    pub eligible: Vec<Candidate>,
    /// Dropped candidates with their first excluding rule.
    pub excluded: Vec<ExclusionRecord>,
}

/// Ordered AND-composition of exclusion rules.
pub struct ExclusionRules {
    /// Rules in evaluation order.
    rules: Vec<Box<dyn ExclusionRule>>,
}

impl ExclusionRules {
    /// Creates a chain from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<Box<dyn ExclusionRule>>) -> Self {
        Self { rules }
    }

    /// Creates the standard notification ad chain.
    #[must_use]
    pub fn notification_ads() -> Self {
        Self::new(vec![
            Box::new(MarkedAsInappropriateExclusionRule),
            Box::new(MarkedToNoLongerReceiveExclusionRule),
            Box::new(SubdivisionTargetingExclusionRule),
            Box::new(AntiTargetingExclusionRule),
            Box::new(DaypartExclusionRule),
            Box::new(DismissedExclusionRule),
            Box::new(FrequencyCapExclusionRule::new(CapKind::PerHour)),
            Box::new(FrequencyCapExclusionRule::new(CapKind::PerDay)),
            Box::new(FrequencyCapExclusionRule::new(CapKind::PerWeek)),
            Box::new(FrequencyCapExclusionRule::new(CapKind::TotalMax)),
            Box::new(FrequencyCapExclusionRule::new(CapKind::DailyCap)),
            Box::new(EmbeddingSimilarityExclusionRule),
        ])
    }

    /// Returns the rule names in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Partitions `candidates` into eligible and excluded sets.
    ///
    /// # Errors
    ///
    /// Returns [`ExclusionError`] when a rule cannot read history.
    pub fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &ExclusionContext<'_>,
    ) -> Result<FilterResult, ExclusionError> {
        let mut result = FilterResult::default();
        'candidates: for candidate in candidates {
            for rule in &self.rules {
                if ctx.params.exclusion.disabled.contains(rule.name()) {
                    continue;
                }
                let verdict = rule
                    .should_exclude(&candidate, ctx)
                    .map_err(|source| ExclusionError::History { rule: rule.name(), source })?;
                if let ExclusionVerdict::Exclude { message } = verdict {
                    result.excluded.push(ExclusionRecord {
                        creative_instance_id: candidate.creative_instance_id.clone(),
                        rule: rule.name().to_string(),
                        uuid: rule.uuid(&candidate),
                        message,
                    });
                    continue 'candidates;
                }
            }
            result.eligible.push(candidate);
        }
        Ok(result)
    }
}

// ============================================================================
// SECTION: User Preference Rules
// ============================================================================

/// Excludes creative sets the user marked as inappropriate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkedAsInappropriateExclusionRule;

impl ExclusionRule for MarkedAsInappropriateExclusionRule {
    fn name(&self) -> &'static str {
        MARKED_AS_INAPPROPRIATE
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_set_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        if candidate.flagged || ctx.state.flagged_creative_sets.contains(&candidate.creative_set_id)
        {
            return Ok(ExclusionVerdict::exclude(format!(
                "creativeSetId {} excluded due to being marked as inappropriate",
                candidate.creative_set_id
            )));
        }
        Ok(ExclusionVerdict::Include)
    }
}

/// Excludes candidates targeting a segment the user no longer wants.
///
/// Disliking a parent segment also covers its children.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkedToNoLongerReceiveExclusionRule;

impl ExclusionRule for MarkedToNoLongerReceiveExclusionRule {
    fn name(&self) -> &'static str {
        MARKED_TO_NO_LONGER_RECEIVE
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_instance_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        let disliked = candidate.segments.iter().find(|segment| {
            ctx.state.disliked_segments.contains(*segment)
                || ctx.state.disliked_segments.contains(&segment.parent())
        });
        Ok(disliked.map_or(ExclusionVerdict::Include, |segment| {
            ExclusionVerdict::exclude(format!(
                "creativeSetId {} excluded due to being marked to no longer receive segment {segment}",
                candidate.creative_set_id
            ))
        }))
    }
}

/// Excludes creative sets anti-targeted by a site the user visited.
#[derive(Debug, Clone, Copy, Default)]
pub struct AntiTargetingExclusionRule;

impl ExclusionRule for AntiTargetingExclusionRule {
    fn name(&self) -> &'static str {
        ANTI_TARGETING
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_set_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        let Some(sites) = ctx.params.exclusion.anti_targeting.get(&candidate.creative_set_id) else {
            return Ok(ExclusionVerdict::Include);
        };
        if sites.iter().any(|site| ctx.state.visited_sites.contains(site)) {
            return Ok(ExclusionVerdict::exclude(format!(
                "creativeSetId {} excluded due to visiting an anti-targeted site",
                candidate.creative_set_id
            )));
        }
        Ok(ExclusionVerdict::Include)
    }
}

// ============================================================================
// SECTION: Targeting Rules
// ============================================================================

/// Excludes geo-targeted candidates when the client subdivision does not match.
///
/// A target matches either the exact subdivision code (`US-CA`) or its
/// country prefix (`US`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SubdivisionTargetingExclusionRule;

impl ExclusionRule for SubdivisionTargetingExclusionRule {
    fn name(&self) -> &'static str {
        SUBDIVISION_TARGETING
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_instance_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        if candidate.geo_targets.is_empty() {
            return Ok(ExclusionVerdict::Include);
        }
        let Some(subdivision) = ctx.state.subdivision.as_deref() else {
            return Ok(ExclusionVerdict::exclude(format!(
                "campaignId {} excluded as the user subdivision is unknown",
                candidate.campaign_id
            )));
        };
        let country = subdivision.split_once('-').map_or(subdivision, |(country, _)| country);
        if candidate.geo_targets.contains(subdivision) || candidate.geo_targets.contains(country) {
            return Ok(ExclusionVerdict::Include);
        }
        Ok(ExclusionVerdict::exclude(format!(
            "campaignId {} excluded as not within the targeted subdivision",
            candidate.campaign_id
        )))
    }
}

/// Excludes candidates whose dayparts do not cover the local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaypartExclusionRule;

impl ExclusionRule for DaypartExclusionRule {
    fn name(&self) -> &'static str {
        DAYPART
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_instance_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        if candidate.dayparts.is_empty() {
            return Ok(ExclusionVerdict::Include);
        }
        let Some(local) = ctx.now.to_local(ctx.state.utc_offset_minutes) else {
            return Ok(ExclusionVerdict::exclude("local time is unavailable"));
        };
        let weekday = local.weekday().number_days_from_sunday();
        let minute = u16::from(local.hour()) * 60 + u16::from(local.minute());
        if candidate.dayparts.iter().any(|daypart| daypart.matches(weekday, minute)) {
            return Ok(ExclusionVerdict::Include);
        }
        Ok(ExclusionVerdict::exclude(format!(
            "campaignId {} excluded as not within a scheduled time slot",
            candidate.campaign_id
        )))
    }
}

/// Excludes candidates whose embedding is too far from the page embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingSimilarityExclusionRule;

impl ExclusionRule for EmbeddingSimilarityExclusionRule {
    fn name(&self) -> &'static str {
        EMBEDDING_SIMILARITY
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_instance_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        let (Some(minimum), Some(page)) =
            (ctx.params.exclusion.min_embedding_similarity, ctx.state.page_embedding.as_deref())
        else {
            return Ok(ExclusionVerdict::Include);
        };
        if candidate.embedding.is_empty() {
            return Ok(ExclusionVerdict::Include);
        }
        let similarity = cosine_similarity(page, &candidate.embedding);
        match similarity {
            Some(similarity) if similarity >= minimum => Ok(ExclusionVerdict::Include),
            Some(similarity) => Ok(ExclusionVerdict::exclude(format!(
                "creativeInstanceId {} excluded due to embedding similarity {similarity:.4} below \
                 {minimum:.4}",
                candidate.creative_instance_id
            ))),
            None => Ok(ExclusionVerdict::exclude(format!(
                "creativeInstanceId {} excluded due to an incomparable embedding",
                candidate.creative_instance_id
            ))),
        }
    }
}

/// Returns the cosine similarity of two vectors, or `None` when undefined.
#[must_use]
pub fn cosine_similarity(lhs: &[f64], rhs: &[f64]) -> Option<f64> {
    if lhs.len() != rhs.len() || lhs.is_empty() {
        return None;
    }
    let dot: f64 = lhs.iter().zip(rhs).map(|(a, b)| a * b).sum();
    let lhs_norm = lhs.iter().map(|a| a * a).sum::<f64>().sqrt();
    let rhs_norm = rhs.iter().map(|b| b * b).sum::<f64>().sqrt();
    let denominator = lhs_norm * rhs_norm;
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(dot / denominator)
}

// ============================================================================
// SECTION: History Rules
// ============================================================================

/// Excludes creative sets dismissed too often within the configured window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DismissedExclusionRule;

impl ExclusionRule for DismissedExclusionRule {
    fn name(&self) -> &'static str {
        DISMISSED
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        candidate.creative_set_id.to_string()
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        let cap = ctx.params.exclusion.dismissed_cap;
        if cap == 0 {
            return Ok(ExclusionVerdict::Include);
        }
        let window = Duration::from_secs(ctx.params.exclusion.dismissed_window_secs);
        let dismissed = ctx.history.event_count(
            &EventScope::CreativeSet(candidate.creative_set_id.clone()),
            AdEventType::Dismissed,
            ctx.now.saturating_sub(window),
        )?;
        if dismissed >= u64::from(cap) {
            return Ok(ExclusionVerdict::exclude(format!(
                "creativeSetId {} excluded due to being dismissed {dismissed} times",
                candidate.creative_set_id
            )));
        }
        Ok(ExclusionVerdict::Include)
    }
}

/// Frequency cap evaluated by [`FrequencyCapExclusionRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    /// Creative instance serves within one hour.
    PerHour,
    /// Creative set serves within one day.
    PerDay,
    /// Creative set serves within one week.
    PerWeek,
    /// Creative set serves over all time.
    TotalMax,
    /// Campaign serves within one day.
    DailyCap,
}

impl CapKind {
    /// Returns the rule name for this cap.
    #[must_use]
    pub const fn rule_name(self) -> &'static str {
        match self {
            Self::PerHour => "per_hour",
            Self::PerDay => "per_day",
            Self::PerWeek => "per_week",
            Self::TotalMax => "total_max",
            Self::DailyCap => "daily_cap",
        }
    }

    /// Returns the rolling window in seconds, or `None` for all time.
    #[must_use]
    pub const fn window_secs(self) -> Option<u64> {
        match self {
            Self::PerHour => Some(3_600),
            Self::PerDay | Self::DailyCap => Some(86_400),
            Self::PerWeek => Some(604_800),
            Self::TotalMax => None,
        }
    }

    /// Returns the configured cap for `candidate`.
    const fn cap(self, candidate: &Candidate) -> u32 {
        match self {
            Self::PerHour => candidate.caps.per_hour,
            Self::PerDay => candidate.caps.per_day,
            Self::PerWeek => candidate.caps.per_week,
            Self::TotalMax => candidate.caps.total_max,
            Self::DailyCap => candidate.caps.daily_cap,
        }
    }

    /// Returns the history scope counted for `candidate`.
    fn scope(self, candidate: &Candidate) -> EventScope {
        match self {
            Self::PerHour => EventScope::CreativeInstance(candidate.creative_instance_id.clone()),
            Self::PerDay | Self::PerWeek | Self::TotalMax => {
                EventScope::CreativeSet(candidate.creative_set_id.clone())
            }
            Self::DailyCap => EventScope::Campaign(candidate.campaign_id.clone()),
        }
    }
}

/// Excludes candidates whose served count in the cap window meets the cap.
///
/// A cap of zero is unlimited.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyCapExclusionRule {
    /// Cap evaluated by this rule.
    kind: CapKind,
}

impl FrequencyCapExclusionRule {
    /// Creates a rule for `kind`.
    #[must_use]
    pub const fn new(kind: CapKind) -> Self {
        Self { kind }
    }
}

impl ExclusionRule for FrequencyCapExclusionRule {
    fn name(&self) -> &'static str {
        self.kind.rule_name()
    }

    fn uuid(&self, candidate: &Candidate) -> String {
        let id = match self.kind.scope(candidate) {
            EventScope::CreativeInstance(id) => id.to_string(),
            EventScope::CreativeSet(id) => id.to_string(),
            EventScope::Campaign(id) => id.to_string(),
            EventScope::AdType(ad_type) => ad_type.to_string(),
        };
        format!("{id}:{}", self.kind.cap(candidate))
    }

    fn should_exclude(
        &self,
        candidate: &Candidate,
        ctx: &ExclusionContext<'_>,
    ) -> Result<ExclusionVerdict, HistoryError> {
        let cap = self.kind.cap(candidate);
        if cap == 0 {
            return Ok(ExclusionVerdict::Include);
        }
        let since = self
            .kind
            .window_secs()
            .map_or(Timestamp::MIN, |secs| ctx.now.saturating_sub(Duration::from_secs(secs)));
        let served =
            ctx.history.event_count(&self.kind.scope(candidate), AdEventType::Served, since)?;
        if served >= u64::from(cap) {
            return Ok(ExclusionVerdict::exclude(format!(
                "creativeInstanceId {} has exceeded the {} frequency cap",
                candidate.creative_instance_id,
                self.kind.rule_name()
            )));
        }
        Ok(ExclusionVerdict::Include)
    }
}
