// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Moments in time, as seen by the engine.

use core::ops::Add;
use core::time::Duration;
use std::sync::OnceLock;
use std::time::Instant;

/// The number of milliseconds in a second.
pub const MILLIS: u64 = 1_000;
/// The number of nanoseconds in a second.
pub const NANOS: u64 = 1_000_000_000;
/// The conversion from nanoseconds to milliseconds.
pub const NANOS_TO_MILLIS: u64 = NANOS / MILLIS;

/// A monotonic timestamp: nanoseconds since an arbitrary, process-wide
/// epoch.
///
/// Packet evaluation takes its `Moment` as an argument instead of
/// reading the clock itself, so a caller replaying a capture (or a
/// test) can supply arrival times of its own.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Moment {
    inner: u64,
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Moment {
    pub fn now() -> Self {
        let nanos = Instant::now().duration_since(epoch()).as_nanos();
        Self { inner: u64::try_from(nanos).unwrap_or(u64::MAX) }
    }

    pub const fn from_raw_nanos(nanos: u64) -> Self {
        Self { inner: nanos }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self { inner: secs.saturating_mul(NANOS) }
    }

    /// The raw nanosecond value, as carried across the API.
    pub fn raw(&self) -> u64 {
        self.inner
    }

    /// Nanoseconds elapsed from `earlier` to `self`, or zero if
    /// `earlier` is actually later.
    pub fn delta_as_nanos(&self, earlier: Moment) -> u64 {
        self.inner.saturating_sub(earlier.inner)
    }

    /// Compute the delta between `self - earlier` and return as
    /// milliseconds.
    pub fn delta_as_millis(&self, earlier: Moment) -> u64 {
        self.delta_as_nanos(earlier) / NANOS_TO_MILLIS
    }
}

impl Add<Duration> for Moment {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Moment { inner: self.inner.saturating_add(nanos) }
    }
}
