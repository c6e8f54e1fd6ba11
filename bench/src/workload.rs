// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Engine configurations and traffic to benchmark them with.

use itertools::iproduct;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use swiftguard::Engine;
use swiftguard_test_utils::*;

const SEED: u64 = 0x5eed_f00d;
const FULL_TABLE_RULES: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub enum Workload {
    /// One rule that no frame falls under.
    NoMatch,
    /// A handful of overlapping rules; every frame matches and drops.
    Drop,
    /// A rule whose bucket is already empty.
    Throttled,
    /// A redirect to a live target.
    Redirect,
    /// A rule store filled with random /24s, with traffic spread
    /// over it.
    FullTable,
}

impl Workload {
    pub const ALL: [Self; 5] = [
        Self::NoMatch,
        Self::Drop,
        Self::Throttled,
        Self::Redirect,
        Self::FullTable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoMatch => "no-match",
            Self::Drop => "drop",
            Self::Throttled => "throttled",
            Self::Redirect => "redirect",
            Self::FullTable => "full-table",
        }
    }

    /// The arrival time every frame is evaluated at.
    pub fn now(&self) -> Moment {
        Moment::from_secs(1)
    }

    pub fn setup(&self) -> (Engine, Vec<Vec<u8>>) {
        let eng = match self {
            Self::FullTable => engine_with(MatchField::Src, FULL_TABLE_RULES),
            _ => engine(),
        };
        let t0 = Moment::from_secs(0);
        let insert = |s: &str| {
            eng.insert_rule(rule(s), t0).unwrap();
        };

        let frames = match self {
            Self::NoMatch => {
                insert("prefix=192.0.2.0/24 action=drop");
                mixed_frames(&["10.0.0.1", "172.16.0.1"])
            }

            Self::Drop => {
                insert("prefix=10.0.0.0/8 action=pass");
                insert("prefix=10.1.0.0/16 action=pass priority=4");
                insert("prefix=10.1.2.0/24 action=drop");
                insert("prefix=10.1.2.0/24 action=drop proto=udp");
                mixed_frames(&["10.1.2.3", "10.1.2.200"])
            }

            Self::Throttled => {
                insert("prefix=10.0.0.0/8 action=pass rate=1");
                let f = udp_frame("10.0.0.1", 1, "10.0.0.2", 2);
                // Drain the single token before any timed run.
                eng.evaluate(&f, self.now());
                vec![f]
            }

            Self::Redirect => {
                insert("prefix=10.0.0.0/8 action=redirect:mirror");
                eng.set_redirect(target("mirror", 2)).unwrap();
                mixed_frames(&["10.0.0.1", "10.200.0.1"])
            }

            Self::FullTable => {
                let mut rng = StdRng::seed_from_u64(SEED);
                let mut srcs = vec![];
                while eng.rules().len() < eng.rules().limit() {
                    let [a, b, c, _] = rng.random::<u32>().to_be_bytes();
                    let prefix = format!("{a}.{b}.{c}.0/24");
                    insert(&format!("prefix={prefix} action=drop"));
                    if srcs.len() < 64 {
                        let d = rng.random::<u8>();
                        srcs.push(format!("{a}.{b}.{c}.{d}"));
                    }
                }
                let srcs: Vec<&str> = srcs.iter().map(String::as_str).collect();
                mixed_frames(&srcs)
            }
        };

        (eng, frames)
    }
}

// TCP and UDP traffic from each source to a few well-known ports.
fn mixed_frames(srcs: &[&str]) -> Vec<Vec<u8>> {
    iproduct!(srcs, [22u16, 53, 443])
        .flat_map(|(src, dport)| {
            [
                tcp_frame(src, 40000, "198.51.100.1", dport, TcpFlags::SYN),
                udp_frame(src, 40000, "198.51.100.1", dport),
            ]
        })
        .collect()
}
