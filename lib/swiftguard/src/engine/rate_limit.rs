// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Per-rule token buckets.
//!
//! A bucket holds at most one second's worth of tokens (`capacity ==
//! rate`) and refills continuously. Refill and consume happen under
//! the bucket's own lock, as they must observe and update the token
//! count and the refill time together.

use super::rule::FilterRule;
use crate::ddi::sync::KMutex;
use crate::ddi::time::Moment;
use crate::ddi::time::NANOS;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateDecision {
    Allowed,
    Throttled,
}

#[derive(Clone, Copy, Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Moment,
}

#[derive(Debug)]
pub struct TokenBucket {
    rate: u32,
    state: KMutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket refilling at `rate` tokens per second.
    pub fn new(rate: u32, now: Moment) -> Self {
        let state = BucketState { tokens: f64::from(rate), last_refill: now };
        Self { rate, state: KMutex::new(state) }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// The number of tokens currently held, without refilling.
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }

    pub fn check(&self, now: Moment) -> RateDecision {
        let capacity = f64::from(self.rate);
        let mut state = self.state.lock();

        // A timestamp from before the last refill adds nothing and does
        // not move the refill point backwards.
        let elapsed = now.delta_as_nanos(state.last_refill);
        if elapsed > 0 {
            let refill = elapsed as f64 / NANOS as f64 * capacity;
            state.tokens = (state.tokens + refill).min(capacity);
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            RateDecision::Allowed
        } else {
            RateDecision::Throttled
        }
    }
}

/// Gate one match of `rule` at `now`. Rules without a rate limit are
/// always allowed.
#[inline]
pub fn check(rule: &FilterRule, now: Moment) -> RateDecision {
    match rule.bucket() {
        None => RateDecision::Allowed,
        Some(bucket) => bucket.check(now),
    }
}
