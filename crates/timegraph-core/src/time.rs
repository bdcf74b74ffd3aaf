//! Timestamps, validity windows and clocks.
//!
//! Timestamps are opaque integer ticks. The generator and CLI use Unix seconds,
//! but nothing in the core depends on the unit: retention windows are expressed
//! in the same ticks as the timestamps they are added to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Sentinel `expiredAt` of the current version.
    pub const NEVER: Timestamp = Timestamp(i64::MAX);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_never(self) -> bool {
        self.0 == i64::MAX
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp())
    }

    /// `None` for [`Timestamp::NEVER`] and for values chrono cannot represent.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if self.is_never() {
            return None;
        }
        DateTime::from_timestamp(self.0, 0)
    }
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;

    fn add(self, ticks: i64) -> Timestamp {
        if self.is_never() {
            return self;
        }
        // Overflow saturates into NEVER.
        Timestamp(self.0.saturating_add(ticks))
    }
}

impl Sub<i64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, ticks: i64) -> Timestamp {
        if self.is_never() {
            return self;
        }
        Timestamp(self.0.saturating_sub(ticks))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Half-open validity interval `[created_at, expired_at)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validity {
    pub created_at: Timestamp,
    pub expired_at: Timestamp,
}

impl Validity {
    /// A window that is still open.
    pub const fn open(created_at: Timestamp) -> Self {
        Self {
            created_at,
            expired_at: Timestamp::NEVER,
        }
    }

    pub const fn is_current(&self) -> bool {
        self.expired_at.is_never()
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.created_at <= at && at < self.expired_at
    }

    pub fn overlaps(&self, other: &Validity) -> bool {
        self.created_at < other.expired_at && other.created_at < self.expired_at
    }

    pub fn closed_at(self, at: Timestamp) -> Self {
        Self {
            created_at: self.created_at,
            expired_at: at,
        }
    }
}

/// Source of "now" for asset creation and mutation.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Wall clock, Unix seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}

/// A clock that only moves when told to. Used by the generator to lay out a
/// simulated history, and by tests.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start.raw()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at.raw(), Ordering::SeqCst);
    }

    /// Move the clock forward and return the new now. Saturates like
    /// `Timestamp + i64`.
    pub fn advance(&self, ticks: i64) -> Timestamp {
        let step = |now: i64| Some((Timestamp::new(now) + ticks).raw());
        match self.now.fetch_update(Ordering::SeqCst, Ordering::SeqCst, step) {
            Ok(prev) | Err(prev) => Timestamp::new(prev) + ticks,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.load(Ordering::SeqCst))
    }
}
