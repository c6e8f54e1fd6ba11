// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Turning a match into a verdict.

use super::rate_limit::RateDecision;
use super::rule::FilterRule;
use crate::api::Egress;
use crate::api::FilterAction;
use crate::api::RedirectId;
use crate::api::Verdict;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub verdict: Verdict,
    /// The matched rule redirects to an id the redirect table does not
    /// hold; the packet was let through instead.
    pub redirect_miss: bool,
}

impl From<Verdict> for Resolution {
    fn from(verdict: Verdict) -> Self {
        Self { verdict, redirect_miss: false }
    }
}

/// Combine the matched rule (if any), its rate decision and the
/// redirect table into the verdict for one packet.
///
/// Anything short of a definite decision to drop or redirect lets the
/// packet pass. A throttled match is dropped whatever the rule's own
/// action says.
pub fn resolve<F>(
    matched: Option<&FilterRule>,
    limit: RateDecision,
    redirect_lookup: F,
) -> Resolution
where
    F: FnOnce(&RedirectId) -> Option<Egress>,
{
    let Some(rule) = matched else {
        return Verdict::Pass.into();
    };

    if limit == RateDecision::Throttled {
        return Verdict::Drop.into();
    }

    match &rule.cfg().action {
        FilterAction::Pass | FilterAction::Count => Verdict::Pass.into(),
        FilterAction::Drop => Verdict::Drop.into(),
        FilterAction::Redirect(id) => match redirect_lookup(id) {
            Some(egress) => Verdict::Redirect(egress).into(),
            None => Resolution { verdict: Verdict::Pass, redirect_miss: true },
        },
    }
}
