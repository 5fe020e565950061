// crates/ad-serving-core/src/runtime/audit.rs
// ============================================================================
// Module: Ad Serving Audit Logging
// Description: Structured audit events for serving decisions and ad events.
// Purpose: Emit JSON-line audit records without a logging framework dependency.
// Dependencies: crate::{core, runtime}, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serde payloads tagged with an `event` name and a
//! `timestamp_ms` taken from the decision time the caller supplied. Sinks
//! decide where lines go: stderr, an append-only file, memory, or nowhere.
//! Sinks never fail the caller; write errors are dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;

use crate::core::AdEventType;
use crate::core::AdState;
use crate::core::PlacementId;
use crate::core::Segment;
use crate::core::Timestamp;
use crate::runtime::exclusion::ExclusionRecord;
use crate::runtime::redemption::RedemptionReport;
use crate::runtime::serving::ServingDecision;
use crate::runtime::serving::ServingOutcome;
use crate::runtime::serving::ServingStage;
use crate::runtime::serving::SuppressionReason;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit payload for a serving attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ServingAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Stages visited.
    pub stages: Vec<ServingStage>,
    /// Segments requested.
    pub segments: Vec<Segment>,
    /// Candidates returned by the catalog.
    pub candidate_count: usize,
    /// Exclusions applied.
    pub excluded: Vec<ExclusionRecord>,
    /// Selected segment.
    pub selected_segment: Option<Segment>,
    /// Committed placement, if any.
    pub placement_id: Option<PlacementId>,
    /// Suppression reason, if any.
    pub suppression: Option<SuppressionReason>,
}

impl ServingAuditEvent {
    /// Builds the audit payload for `decision`.
    #[must_use]
    pub fn from_decision(decision: &ServingDecision) -> Self {
        let (placement_id, suppression) = match &decision.outcome {
            ServingOutcome::Committed { ad } => (Some(ad.placement_id.clone()), None),
            ServingOutcome::Suppressed { reason } => (None, Some(reason.clone())),
        };
        Self {
            event: "serving_decision",
            timestamp_ms: decision.decided_at.as_unix_millis(),
            stages: decision.stages.clone(),
            segments: decision.segments.iter().cloned().collect(),
            candidate_count: decision.candidate_count,
            excluded: decision.excluded.clone(),
            selected_segment: decision.selected_segment.clone(),
            placement_id,
            suppression,
        }
    }
}

/// Audit payload for an ad event trigger.
#[derive(Debug, Clone, Serialize)]
pub struct AdEventAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Placement identifier.
    pub placement_id: PlacementId,
    /// Requested event type.
    pub event_type: AdEventType,
    /// State after the trigger; `None` for untracked placements.
    pub state: Option<AdState>,
    /// True when the transition was applied.
    pub accepted: bool,
    /// Rejection reason or collaborator warnings.
    pub messages: Vec<String>,
}

/// Inputs for [`AdEventAuditEvent::new`].
pub struct AdEventAuditParams {
    /// Trigger time.
    pub at: Timestamp,
    /// Placement identifier.
    pub placement_id: PlacementId,
    /// Requested event type.
    pub event_type: AdEventType,
    /// State after the trigger.
    pub state: Option<AdState>,
    /// True when the transition was applied.
    pub accepted: bool,
    /// Rejection reason or collaborator warnings.
    pub messages: Vec<String>,
}

impl AdEventAuditEvent {
    /// Builds an ad event audit payload.
    #[must_use]
    pub fn new(params: AdEventAuditParams) -> Self {
        Self {
            event: "ad_event",
            timestamp_ms: params.at.as_unix_millis(),
            placement_id: params.placement_id,
            event_type: params.event_type,
            state: params.state,
            accepted: params.accepted,
            messages: params.messages,
        }
    }
}

/// Audit payload for a redemption attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Attempt report.
    #[serde(flatten)]
    pub report: RedemptionReport,
}

impl RedemptionAuditEvent {
    /// Builds a redemption audit payload.
    #[must_use]
    pub const fn new(at: Timestamp, report: RedemptionReport) -> Self {
        Self {
            event: "redemption",
            timestamp_ms: at.as_unix_millis(),
            report,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for serving events.
pub trait AuditSink: Send + Sync {
    /// Record a serving decision.
    fn record_serving(&self, event: &ServingAuditEvent);

    /// Record an ad event trigger.
    fn record_ad_event(&self, _event: &AdEventAuditEvent) {}

    /// Record a redemption attempt.
    fn record_redemption(&self, _event: &RedemptionAuditEvent) {}
}

/// Serializes `event` as a single JSON line.
fn to_line<T: Serialize>(event: &T) -> Option<String> {
    serde_json::to_string(event).ok()
}

/// Audit sink that logs JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one line to stderr.
    fn emit(line: Option<String>) {
        if let Some(payload) = line {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_serving(&self, event: &ServingAuditEvent) {
        Self::emit(to_line(event));
    }

    fn record_ad_event(&self, event: &AdEventAuditEvent) {
        Self::emit(to_line(event));
    }

    fn record_redemption(&self, event: &RedemptionAuditEvent) {
        Self::emit(to_line(event));
    }
}

/// Audit sink that logs JSON lines to a file.
#[derive(Debug)]
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one line and flushes.
    fn emit(&self, line: Option<String>) {
        if let Some(payload) = line
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_serving(&self, event: &ServingAuditEvent) {
        self.emit(to_line(event));
    }

    fn record_ad_event(&self, event: &AdEventAuditEvent) {
        self.emit(to_line(event));
    }

    fn record_redemption(&self, event: &RedemptionAuditEvent) {
        self.emit(to_line(event));
    }
}

/// Audit sink that keeps JSON lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    /// Recorded lines.
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stores one line.
    fn emit(&self, line: Option<String>) {
        if let Some(payload) = line {
            self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(payload);
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_serving(&self, event: &ServingAuditEvent) {
        self.emit(to_line(event));
    }

    fn record_ad_event(&self, event: &AdEventAuditEvent) {
        self.emit(to_line(event));
    }

    fn record_redemption(&self, event: &RedemptionAuditEvent) {
        self.emit(to_line(event));
    }
}

/// No-op audit sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_serving(&self, _event: &ServingAuditEvent) {}
}
