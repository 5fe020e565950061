// crates/ad-serving-core/src/core/time.rs
// ============================================================================
// Module: Ad Serving Time Model
// Description: Canonical timestamps and the clock interface for serving decisions.
// Purpose: Keep serving decisions replayable by passing time explicitly.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The serving pipeline never reads wall-clock time on its own. Hosts supply
//! a [`Timestamp`] per opportunity or event, usually from a [`Clock`]. Local
//! calendar fields (weekday, hour) are derived with the `time` crate using the
//! client's UTC offset.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::UtcOffset;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Milliseconds per second.
const MILLIS_PER_SECOND: i64 = 1_000;

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Earliest representable timestamp; used for unbounded look-back windows.
    pub const MIN: Self = Self(i64::MIN);

    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from unix epoch seconds.
    #[must_use]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(MILLIS_PER_SECOND))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp as whole unix epoch seconds.
    #[must_use]
    pub const fn as_unix_secs(self) -> i64 {
        self.0.div_euclid(MILLIS_PER_SECOND)
    }

    /// Returns the timestamp moved back by `duration`, saturating at [`Timestamp::MIN`].
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration_millis(duration)))
    }

    /// Returns the timestamp moved forward by `duration`, saturating at the maximum.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_millis(duration)))
    }

    /// Returns the elapsed duration since `earlier`, or zero when `earlier` is later.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        u64::try_from(delta).map_or(Duration::ZERO, Duration::from_millis)
    }

    /// Converts the timestamp into a local date-time for the given UTC offset.
    ///
    /// Returns `None` when the timestamp or offset is out of range.
    #[must_use]
    pub fn to_local(self, utc_offset_minutes: i32) -> Option<OffsetDateTime> {
        let offset = UtcOffset::from_whole_seconds(utc_offset_minutes.checked_mul(60)?).ok()?;
        let nanos = i128::from(self.0).checked_mul(1_000_000)?;
        let utc = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
        Some(utc.to_offset(offset))
    }
}

/// Converts a duration into whole milliseconds, saturating at `i64::MAX`.
fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time for hosts driving the pipeline.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Timestamp(i64::try_from(nanos).unwrap_or(i64::MAX))
    }
}

/// Manually advanced clock for tests and simulations.
///
/// # Invariants
/// - Clones share the same underlying instant.
#[derive(Debug, Clone, Default)]
pub struct FixedClock {
    /// Current instant in unix epoch milliseconds.
    millis: Arc<AtomicI64>,
}

impl FixedClock {
    /// Creates a clock pinned at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.millis.fetch_add(duration_millis(duration), Ordering::SeqCst);
    }

    /// Pins the clock at `instant`.
    pub fn set(&self, instant: Timestamp) {
        self.millis.store(instant.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}
