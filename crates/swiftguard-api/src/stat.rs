// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types for handling classification stats from the command API.

use super::rule::RuleId;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// Counters for a single rule.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuleStats {
    pub packets: u64,
    pub bytes: u64,
    /// Monotonic nanoseconds of the most recent match, if any.
    pub last_matched: Option<u64>,
}

/// Engine-wide counters, incremented for every packet evaluated
/// whether or not a rule matched.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GlobalStats {
    pub packets: u64,
    pub bytes: u64,

    pub pass: u64,
    pub drop: u64,
    pub redirect: u64,

    /// Packets that selected a live rule and passed its filters.
    pub matched: u64,
    /// Frames the header parser rejected.
    pub parse_fail: u64,
    /// No stored prefix covered the packet.
    pub no_match: u64,
    /// The best-prefix rule's protocol/port/flag filters rejected the
    /// packet.
    pub filter_miss: u64,
    /// The best-prefix rule had expired.
    pub expired: u64,
    pub throttled: u64,
    /// A redirect rule named a target missing from the redirect table.
    pub redirect_miss: u64,
}

/// A point-in-time read of every counter in the engine.
///
/// Each counter is read atomically on its own; the snapshot as a whole
/// is not a consistent cut across counters.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StatsSnapshot {
    /// Monotonic nanoseconds at which the snapshot was taken.
    pub taken_at: u64,
    pub global: GlobalStats,
    pub rules: Vec<(RuleId, RuleStats)>,
}

impl StatsSnapshot {
    pub fn rule(&self, id: RuleId) -> Option<&RuleStats> {
        self.rules.iter().find(|(rid, _)| *rid == id).map(|(_, s)| s)
    }
}

/// Packet and bit rates over the interval between two snapshots.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Throughput {
    pub pps: f64,
    pub mbps: f64,
}

impl Throughput {
    /// Compute the rates between `prev` and `cur`. A zero or negative
    /// interval yields zero rates.
    pub fn between(prev: &StatsSnapshot, cur: &StatsSnapshot) -> Self {
        let elapsed_ns = cur.taken_at.saturating_sub(prev.taken_at);
        if elapsed_ns == 0 {
            return Self::default();
        }

        let secs = elapsed_ns as f64 / 1_000_000_000.0;
        let pkts = cur.global.packets.saturating_sub(prev.global.packets);
        let bytes = cur.global.bytes.saturating_sub(prev.global.bytes);

        Self {
            pps: pkts as f64 / secs,
            mbps: (bytes as f64 * 8.0) / secs / 1_000_000.0,
        }
    }
}

impl Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.0} pps, {:.2} Mbps", self.pps, self.mbps)
    }
}
