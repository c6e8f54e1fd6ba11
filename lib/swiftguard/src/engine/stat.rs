// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Packet accounting.
//!
//! Every counter is an independent atomic updated with `Relaxed`
//! ordering: evaluations never wait on one another to count, and a
//! reader sees each counter whole, but not a consistent cut across
//! counters.

use crate::api::GlobalStats as ApiGlobalStats;
use crate::api::RuleStats as ApiRuleStats;
use crate::api::Verdict;
use crate::ddi::time::Moment;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// Counters belonging to a single rule.
///
/// Shared by every version of the rule: an update swaps the rule
/// record but carries the same `RuleStat` across.
#[derive(Debug, Default)]
pub struct RuleStat {
    packets: AtomicU64,
    bytes: AtomicU64,
    // The raw `Moment` plus one, so that zero can mean "never".
    last_matched: AtomicU64,
}

impl RuleStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one packet of `pkt_len` bytes matched at `now`.
    #[inline]
    pub fn hit_at(&self, pkt_len: u64, now: Moment) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(pkt_len, Ordering::Relaxed);
        // Concurrent matchers may finish out of order; keep the latest.
        self.last_matched
            .fetch_max(now.raw().saturating_add(1), Ordering::Relaxed);
    }

    pub fn last_matched(&self) -> Option<Moment> {
        match self.last_matched.load(Ordering::Relaxed) {
            0 => None,
            raw => Some(Moment::from_raw_nanos(raw - 1)),
        }
    }
}

impl From<&RuleStat> for ApiRuleStats {
    fn from(val: &RuleStat) -> Self {
        ApiRuleStats {
            packets: val.packets.load(Ordering::Relaxed),
            bytes: val.bytes.load(Ordering::Relaxed),
            last_matched: val.last_matched().map(|m| m.raw()),
        }
    }
}

/// Why a packet that parsed did not end up on a rule's action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Miss {
    NoMatch,
    FilterMiss,
    Expired,
}

/// Engine-wide counters.
#[derive(Debug, Default)]
pub struct GlobalStat {
    packets: AtomicU64,
    bytes: AtomicU64,
    pass: AtomicU64,
    drop: AtomicU64,
    redirect: AtomicU64,
    matched: AtomicU64,
    parse_fail: AtomicU64,
    no_match: AtomicU64,
    filter_miss: AtomicU64,
    expired: AtomicU64,
    throttled: AtomicU64,
    redirect_miss: AtomicU64,
}

impl GlobalStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every packet seen, before anything is known about it.
    #[inline]
    pub fn seen(&self, pkt_len: u64) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(pkt_len, Ordering::Relaxed);
    }

    #[inline]
    pub fn verdict(&self, verdict: &Verdict) {
        let ctr = match verdict {
            Verdict::Pass => &self.pass,
            Verdict::Drop => &self.drop,
            Verdict::Redirect(_) => &self.redirect,
        };
        ctr.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn parse_fail(&self) {
        self.parse_fail.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn miss(&self, miss: Miss) {
        let ctr = match miss {
            Miss::NoMatch => &self.no_match,
            Miss::FilterMiss => &self.filter_miss,
            Miss::Expired => &self.expired,
        };
        ctr.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn matched(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn redirect_miss(&self) {
        self.redirect_miss.fetch_add(1, Ordering::Relaxed);
    }
}

impl From<&GlobalStat> for ApiGlobalStats {
    fn from(val: &GlobalStat) -> Self {
        ApiGlobalStats {
            packets: val.packets.load(Ordering::Relaxed),
            bytes: val.bytes.load(Ordering::Relaxed),
            pass: val.pass.load(Ordering::Relaxed),
            drop: val.drop.load(Ordering::Relaxed),
            redirect: val.redirect.load(Ordering::Relaxed),
            matched: val.matched.load(Ordering::Relaxed),
            parse_fail: val.parse_fail.load(Ordering::Relaxed),
            no_match: val.no_match.load(Ordering::Relaxed),
            filter_miss: val.filter_miss.load(Ordering::Relaxed),
            expired: val.expired.load(Ordering::Relaxed),
            throttled: val.throttled.load(Ordering::Relaxed),
            redirect_miss: val.redirect_miss.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn rule_hits() {
        let stat = RuleStat::new();
        assert_eq!(stat.last_matched(), None);

        stat.hit_at(60, Moment::from_secs(0));
        assert_eq!(stat.last_matched(), Some(Moment::from_secs(0)));

        stat.hit_at(1500, Moment::from_secs(3));
        // An evaluation that started earlier finishing later.
        stat.hit_at(40, Moment::from_secs(2));

        let api = ApiRuleStats::from(&stat);
        assert_eq!(api.packets, 3);
        assert_eq!(api.bytes, 1600);
        assert_eq!(api.last_matched, Some(Moment::from_secs(3).raw()));
    }

    #[test]
    fn concurrent_hits_are_not_lost() {
        let stat = Arc::new(RuleStat::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let stat = stat.clone();
                std::thread::spawn(move || {
                    for j in 0..1000 {
                        stat.hit_at(10, Moment::from_raw_nanos(i * 1000 + j));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let api = ApiRuleStats::from(&*stat);
        assert_eq!(api.packets, 8000);
        assert_eq!(api.bytes, 80_000);
        assert_eq!(api.last_matched, Some(7999));
    }

    #[test]
    fn global_counters() {
        let g = GlobalStat::new();
        g.seen(100);
        g.seen(50);
        g.parse_fail();
        g.miss(Miss::NoMatch);
        g.miss(Miss::Expired);
        g.verdict(&Verdict::Pass);
        g.verdict(&Verdict::Drop);

        let api = ApiGlobalStats::from(&g);
        assert_eq!(api.packets, 2);
        assert_eq!(api.bytes, 150);
        assert_eq!(api.parse_fail, 1);
        assert_eq!(api.no_match, 1);
        assert_eq!(api.expired, 1);
        assert_eq!(api.filter_miss, 0);
        assert_eq!((api.pass, api.drop, api.redirect), (1, 1, 0));
    }
}
