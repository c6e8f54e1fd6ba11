// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Stored filter rules.
//!
//! A [`FilterRule`] is immutable once built. The rule store shares it
//! behind an `Arc`, and an update replaces the whole record; only the
//! counters and the token bucket hanging off it change in place.

use super::packet::FlowKey;
use super::rate_limit::TokenBucket;
use super::stat::RuleStat;
use crate::api::RuleCfg;
use crate::api::RuleDump;
use crate::api::RuleId;
use crate::api::SgError;
use crate::ddi::time::Moment;
use crate::ddi::time::NANOS;
use alloc::sync::Arc;
use core::cmp::Ordering;

#[derive(Debug)]
pub struct FilterRule {
    id: RuleId,
    cfg: RuleCfg,
    created_at: Moment,
    stats: Arc<RuleStat>,
    bucket: Option<Arc<TokenBucket>>,
}

impl FilterRule {
    /// Build a brand new rule from a control-plane configuration.
    ///
    /// Ids are handed out in increasing order, so a smaller id means an
    /// earlier insertion.
    pub fn new(id: RuleId, cfg: RuleCfg, now: Moment) -> Result<Self, SgError> {
        cfg.validate().map_err(SgError::InvalidRule)?;
        let bucket = new_bucket(cfg.rate_limit, now);

        Ok(Self {
            id,
            cfg,
            created_at: now,
            stats: Arc::new(RuleStat::new()),
            bucket,
        })
    }

    /// Build the replacement for `self` carrying `cfg`.
    ///
    /// The identity of the rule survives an update: its id, creation
    /// time and counters carry over. The token bucket
    /// carries over too unless the rate changed.
    pub fn replace(&self, cfg: RuleCfg, now: Moment) -> Result<Self, SgError> {
        cfg.validate().map_err(SgError::InvalidRule)?;
        let bucket = if cfg.rate_limit == self.cfg.rate_limit {
            self.bucket.clone()
        } else {
            new_bucket(cfg.rate_limit, now)
        };

        Ok(Self {
            id: self.id,
            cfg,
            created_at: self.created_at,
            stats: self.stats.clone(),
            bucket,
        })
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn cfg(&self) -> &RuleCfg {
        &self.cfg
    }

    pub fn created_at(&self) -> Moment {
        self.created_at
    }

    pub fn stats(&self) -> &RuleStat {
        &self.stats
    }

    pub fn bucket(&self) -> Option<&TokenBucket> {
        self.bucket.as_deref()
    }

    /// Rank two rules stored at the same prefix: higher priority
    /// first, then earlier insertion. `Ordering::Less` means `self`
    /// wins.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .cfg
            .priority
            .cmp(&self.cfg.priority)
            .then(self.id.cmp(&other.id))
    }

    /// Protocol, port range and TCP flag filters. The flag test only
    /// applies to TCP packets.
    #[inline]
    pub fn matches_filters(&self, key: &FlowKey) -> bool {
        let cfg = &self.cfg;

        cfg.proto.matches(key.proto)
            && cfg.src_ports.contains(key.src_port)
            && cfg.dst_ports.contains(key.dst_port)
            && (!key.is_tcp() || cfg.tcp_flags.subset_of(key.tcp_flags))
    }

    /// Has the rule outlived its `expire_after` at `now`?
    #[inline]
    pub fn is_expired(&self, now: Moment) -> bool {
        if self.cfg.expire_after == 0 {
            return false;
        }

        let ttl = u64::from(self.cfg.expire_after).saturating_mul(NANOS);
        now.delta_as_nanos(self.created_at) > ttl
    }

    pub fn dump(&self, now: Moment) -> RuleDump {
        RuleDump {
            id: self.id,
            cfg: self.cfg.clone(),
            created_at: self.created_at.raw(),
            expired: self.is_expired(now),
            stats: self.stats.as_ref().into(),
        }
    }
}

fn new_bucket(rate: u32, now: Moment) -> Option<Arc<TokenBucket>> {
    (rate > 0).then(|| Arc::new(TokenBucket::new(rate, now)))
}
