// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Benchmark support: classification workloads and the measurements
//! they are run under.

use criterion::measurement::Measurement;
use criterion::measurement::WallTime;

#[cfg(feature = "alloc")]
pub mod alloc;
pub mod workload;

/// A [`Measurement`] with a short name, used to keep the results of
/// each measurement in their own benchmark group.
pub trait MeasurementInfo: Measurement {
    fn label() -> &'static str;
}

impl MeasurementInfo for WallTime {
    fn label() -> &'static str {
        "wallclock"
    }
}

/// The benchmark group for `stage` measured by `M`, e.g.
/// `evaluate/wallclock`.
pub fn group_name<M: MeasurementInfo>(stage: &str) -> String {
    format!("{stage}/{}", M::label())
}

/// Hands out a workload's frames round-robin, one per iteration, so a
/// benchmark sees the whole traffic mix rather than one hot frame.
pub struct FrameCycle<'a> {
    frames: &'a [Vec<u8>],
    next: usize,
}

impl<'a> FrameCycle<'a> {
    /// `frames` must not be empty.
    pub fn new(frames: &'a [Vec<u8>]) -> Self {
        assert!(!frames.is_empty(), "workload has no frames");
        Self { frames, next: 0 }
    }

    pub fn next_frame(&mut self) -> &'a [u8] {
        let frame = &self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();
        frame
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cycle_wraps() {
        let frames = vec![vec![1], vec![2], vec![3]];
        let mut cycle = FrameCycle::new(&frames);
        let seen: Vec<u8> = (0..7).map(|_| cycle.next_frame()[0]).collect();
        assert_eq!(seen, [1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn group_names() {
        assert_eq!(group_name::<WallTime>("parse"), "parse/wallclock");
    }
}
