// crates/ad-serving-core/src/runtime/observers.rs
// ============================================================================
// Module: Ad Serving Observers
// Description: Explicit observer registry and a channel-backed observer.
// Purpose: Deliver serving and lifecycle notifications to UI delegates.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! [`ObserverList`] holds non-owning references to delegates. Registration
//! returns an [`ObserverId`] used to unregister; delegates that were dropped
//! without unregistering are skipped and pruned on the next notification.
//!
//! [`ChannelObserver`] forwards every notification into a
//! `tokio::sync::mpsc` channel for hosts that consume events asynchronously.
//! Invariants:
//! - Each notification enqueues at most one [`NotificationAdEvent`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc::Sender;

use crate::core::AdEventType;
use crate::core::NotificationAdInfo;
use crate::core::Segment;
use crate::interfaces::NotificationAdObserver;

// ============================================================================
// SECTION: Observer List
// ============================================================================

/// Registration handle for an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Registry of non-owning observer references.
#[derive(Default)]
pub struct ObserverList {
    /// Registered observers in registration order.
    entries: Vec<(ObserverId, Weak<dyn NotificationAdObserver>)>,
    /// Next identifier to issue.
    next_id: u64,
}

impl ObserverList {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `observer` without taking ownership.
    pub fn add(&mut self, observer: &Arc<dyn NotificationAdObserver>) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.entries.push((id, Arc::downgrade(observer)));
        id
    }

    /// Unregisters an observer. Returns false when the id is unknown.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Returns the number of live observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(_, observer)| observer.strong_count() > 0).count()
    }

    /// Returns true when no live observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `notify` on every live observer and prunes dropped ones.
    pub fn for_each(&mut self, notify: impl Fn(&dyn NotificationAdObserver)) {
        self.entries.retain(|(_, observer)| {
            observer.upgrade().is_some_and(|observer| {
                notify(observer.as_ref());
                true
            })
        });
    }

    /// Notifies observers about a lifecycle event for `ad`.
    pub fn notify_event(&mut self, ad: &NotificationAdInfo, event_type: AdEventType) {
        self.for_each(|observer| match event_type {
            AdEventType::Served => observer.on_ad_served(ad),
            AdEventType::Viewed => observer.on_ad_viewed(ad),
            AdEventType::Clicked => observer.on_ad_clicked(ad),
            AdEventType::Dismissed => observer.on_ad_dismissed(ad),
            AdEventType::TimedOut => observer.on_ad_timed_out(ad),
        });
    }
}

// ============================================================================
// SECTION: Channel Observer
// ============================================================================

/// Notification forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationAdEvent {
    /// A serving opportunity passed the permission gate.
    OpportunityArose {
        /// Segments requested from the catalog.
        segments: BTreeSet<Segment>,
    },
    /// A serving opportunity was suppressed.
    FailedToServe,
    /// A lifecycle event was recorded.
    Lifecycle {
        /// Event type.
        event_type: AdEventType,
        /// Ad after the transition.
        ad: NotificationAdInfo,
    },
}

/// Observer that forwards notifications into a Tokio mpsc channel.
///
/// # Invariants
/// - Notifications that cannot be enqueued are counted, never retried.
#[derive(Debug)]
pub struct ChannelObserver {
    /// Sender used to forward notifications.
    sender: Sender<NotificationAdEvent>,
    /// Notifications dropped because the channel was full or closed.
    dropped: AtomicU64,
}

impl ChannelObserver {
    /// Creates a channel observer.
    #[must_use]
    pub const fn new(sender: Sender<NotificationAdEvent>) -> Self {
        Self {
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns the number of dropped notifications.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueues `event`, counting it as dropped on failure.
    fn forward(&self, event: NotificationAdEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Forwards a lifecycle event.
    fn lifecycle(&self, event_type: AdEventType, ad: &NotificationAdInfo) {
        self.forward(NotificationAdEvent::Lifecycle {
            event_type,
            ad: ad.clone(),
        });
    }
}

impl NotificationAdObserver for ChannelObserver {
    fn on_opportunity_arose(&self, segments: &BTreeSet<Segment>) {
        self.forward(NotificationAdEvent::OpportunityArose {
            segments: segments.clone(),
        });
    }

    fn on_failed_to_serve(&self) {
        self.forward(NotificationAdEvent::FailedToServe);
    }

    fn on_ad_served(&self, ad: &NotificationAdInfo) {
        self.lifecycle(AdEventType::Served, ad);
    }

    fn on_ad_viewed(&self, ad: &NotificationAdInfo) {
        self.lifecycle(AdEventType::Viewed, ad);
    }

    fn on_ad_clicked(&self, ad: &NotificationAdInfo) {
        self.lifecycle(AdEventType::Clicked, ad);
    }

    fn on_ad_dismissed(&self, ad: &NotificationAdInfo) {
        self.lifecycle(AdEventType::Dismissed, ad);
    }

    fn on_ad_timed_out(&self, ad: &NotificationAdInfo) {
        self.lifecycle(AdEventType::TimedOut, ad);
    }
}
