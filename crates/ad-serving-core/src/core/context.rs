// crates/ad-serving-core/src/core/context.rs
// ============================================================================
// Module: Ad Serving Client Context
// Description: Process-wide client signals read by permission and exclusion rules.
// Purpose: Replace ambient singletons with an explicitly shared context handle.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! [`ClientState`] holds the browser, user, and targeting signals that rules
//! read. Hosts share a single [`ClientContext`] handle between the serving
//! orchestrator and the event handler; rules only ever see snapshots so a
//! decision is evaluated against one consistent view.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CreativeSetId;
use crate::core::identifiers::Segment;

// ============================================================================
// SECTION: Platform
// ============================================================================

/// Host platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Windows desktop.
    Windows,
    /// macOS desktop.
    MacOs,
    /// Linux desktop.
    #[default]
    Linux,
    /// Android.
    Android,
    /// iOS.
    Ios,
}

impl Platform {
    /// Returns true for mobile platforms.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

// ============================================================================
// SECTION: Client State
// ============================================================================

/// Snapshot of process-wide client signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientState {
    /// User opted in to ads.
    pub ads_enabled: bool,
    /// User opted in to rewards (opted-in confirmations).
    pub rewards_opted_in: bool,
    /// Host platform.
    pub platform: Platform,
    /// Browser window is active.
    pub browser_active: bool,
    /// Browser is in the foreground.
    pub browser_foreground: bool,
    /// Media is playing.
    pub media_playing: bool,
    /// Browser is in full-screen mode.
    pub full_screen: bool,
    /// Creative sets the user marked as inappropriate.
    pub flagged_creative_sets: BTreeSet<CreativeSetId>,
    /// Segments the user no longer wants to receive.
    pub disliked_segments: BTreeSet<Segment>,
    /// Interest segments derived for the user.
    pub interest_segments: BTreeSet<Segment>,
    /// Subdivision code (`US-CA`), if known.
    pub subdivision: Option<String>,
    /// Registrable domains of recently visited sites.
    pub visited_sites: BTreeSet<String>,
    /// Embedding of the current page text, if computed.
    pub page_embedding: Option<Vec<f64>>,
    /// Local offset from UTC in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            ads_enabled: true,
            rewards_opted_in: false,
            platform: Platform::default(),
            browser_active: true,
            browser_foreground: true,
            media_playing: false,
            full_screen: false,
            flagged_creative_sets: BTreeSet::new(),
            disliked_segments: BTreeSet::new(),
            interest_segments: BTreeSet::new(),
            subdivision: None,
            visited_sites: BTreeSet::new(),
            page_embedding: None,
            utc_offset_minutes: 0,
        }
    }
}

// ============================================================================
// SECTION: Shared Handle
// ============================================================================

/// Shared handle to the client state.
///
/// # Invariants
/// - Clones observe the same state.
/// - Readers receive owned snapshots; no lock is held across rule evaluation.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    /// Shared state.
    state: Arc<RwLock<ClientState>>,
}

impl ClientContext {
    /// Creates a context seeded with `state`.
    #[must_use]
    pub fn new(state: ClientState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ClientState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Applies `change` to the shared state.
    pub fn update(&self, change: impl FnOnce(&mut ClientState)) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut guard);
    }

    /// Restores the default state (profile teardown).
    pub fn reset(&self) {
        self.update(|state| *state = ClientState::default());
    }

    /// Marks a creative set as inappropriate.
    pub fn flag_creative_set(&self, creative_set_id: CreativeSetId) {
        self.update(|state| {
            state.flagged_creative_sets.insert(creative_set_id);
        });
    }

    /// Marks a segment as no longer wanted.
    pub fn dislike_segment(&self, segment: Segment) {
        self.update(|state| {
            state.disliked_segments.insert(segment);
        });
    }

    /// Replaces the user's interest segments.
    pub fn set_interest_segments(&self, segments: BTreeSet<Segment>) {
        self.update(|state| state.interest_segments = segments);
    }
}
