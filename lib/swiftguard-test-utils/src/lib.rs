// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod frame;
pub mod pcap;

// Let's make our lives easier and pub use a bunch of stuff.
pub use frame::*;
pub use smoltcp::wire::EthernetProtocol;
pub use swiftguard::Engine;
pub use swiftguard::EngineCfg;
pub use swiftguard::api::Egress;
pub use swiftguard::api::FilterAction;
pub use swiftguard::api::MatchField;
pub use swiftguard::api::RedirectTarget;
pub use swiftguard::api::RuleCfg;
pub use swiftguard::api::RuleId;
pub use swiftguard::api::SgError;
pub use swiftguard::api::TcpFlags;
pub use swiftguard::api::Verdict;
pub use swiftguard::ddi::time::Moment;
pub use swiftguard::provider::Providers;

/// An engine with default settings and the null logger.
pub fn engine() -> Engine {
    Engine::new(EngineCfg::default(), Providers::default())
}

/// An engine matching on `field`, holding at most `max_rules`.
pub fn engine_with(field: MatchField, max_rules: usize) -> Engine {
    let cfg = EngineCfg { match_field: field, max_rules };
    Engine::new(cfg, Providers::default())
}

/// Parse a rule, panicking on bad input.
pub fn rule(s: &str) -> RuleCfg {
    match s.parse() {
        Ok(cfg) => cfg,
        Err(e) => panic!("bad rule {s:?}: {e}"),
    }
}

/// Build a redirect target for `id` on interface `ethN`.
pub fn target(id: &str, ifindex: u32) -> RedirectTarget {
    RedirectTarget {
        id: id.parse().unwrap(),
        egress: Egress::new(ifindex, &format!("eth{ifindex}")).unwrap(),
    }
}
