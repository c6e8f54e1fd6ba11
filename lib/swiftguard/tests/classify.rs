// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Classification tests.
//!
//! Every frame here is built by smoltcp's encoders and pushed through
//! `Engine::evaluate`, so these exercise the full pipeline from bytes
//! to verdict.

use common::*;
use itertools::iproduct;
use std::time::Duration;
use swiftguard_test_utils as common;

const T0: Moment = Moment::from_secs(100);

fn syn(src: &str, dport: u16) -> Vec<u8> {
    tcp_frame(src, 40000, "192.168.0.1", dport, TcpFlags::SYN)
}

#[test]
fn no_covering_rule_passes_and_counts() {
    let eng = engine();
    eng.insert_rule(rule("prefix=172.16.0.0/12 action=drop"), T0).unwrap();

    let frames = [
        syn("10.0.0.5", 22),
        udp_frame("10.0.0.5", 5353, "10.0.0.1", 53),
        icmp_frame("192.168.9.9", "10.0.0.1"),
    ];
    for f in &frames {
        assert_eq!(eng.evaluate(f, T0), Verdict::Pass);
    }

    let g = eng.global_stats();
    assert_eq!(g.packets, 3);
    assert_eq!(g.bytes, frames.iter().map(|f| f.len() as u64).sum::<u64>());
    assert_eq!(g.no_match, 3);
    assert_eq!(g.pass, 3);
    assert_eq!(g.matched, 0);
}

#[test]
fn longest_prefix_beats_priority() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=pass priority=1000"), T0)
        .unwrap();
    let b = eng
        .insert_rule(rule("prefix=10.0.0.0/24 action=drop priority=0"), T0)
        .unwrap();

    assert_eq!(eng.evaluate(&syn("10.0.0.5", 80), T0), Verdict::Drop);
    assert_eq!(eng.evaluate(&syn("10.0.1.5", 80), T0), Verdict::Pass);

    let snap = eng.snapshot_stats(T0);
    assert_eq!(snap.rule(b).unwrap().packets, 1);
}

#[test]
fn filter_miss_does_not_fall_back() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=drop dport=1-65535"), T0)
        .unwrap();
    eng.insert_rule(rule("prefix=10.0.0.0/24 action=drop dport=443"), T0)
        .unwrap();

    // Covered by both, but only the /24 is ever consulted.
    assert_eq!(eng.evaluate(&syn("10.0.0.5", 22), T0), Verdict::Pass);
    assert_eq!(eng.evaluate(&syn("10.0.0.5", 443), T0), Verdict::Drop);
    // Outside the /24 the /8 applies.
    assert_eq!(eng.evaluate(&syn("10.1.0.5", 22), T0), Verdict::Drop);

    assert_eq!(eng.global_stats().filter_miss, 1);
}

#[test]
fn secondary_filters() {
    let eng = engine();
    eng.insert_rule(
        rule(
            "prefix=10.0.0.0/8 action=drop proto=tcp sport=40000-40010 \
             dport=22 flags=syn",
        ),
        T0,
    )
    .unwrap();

    let cases = [
        (tcp_frame("10.0.0.1", 40000, "1.1.1.1", 22, TcpFlags::SYN), true),
        (
            tcp_frame(
                "10.0.0.1",
                40010,
                "1.1.1.1",
                22,
                TcpFlags::SYN | TcpFlags::ACK,
            ),
            true,
        ),
        (tcp_frame("10.0.0.1", 40011, "1.1.1.1", 22, TcpFlags::SYN), false),
        (tcp_frame("10.0.0.1", 40000, "1.1.1.1", 23, TcpFlags::SYN), false),
        (tcp_frame("10.0.0.1", 40000, "1.1.1.1", 22, TcpFlags::ACK), false),
        (udp_frame("10.0.0.1", 40000, "1.1.1.1", 22), false),
    ];

    for (i, (frame, drop)) in cases.iter().enumerate() {
        let expected = if *drop { Verdict::Drop } else { Verdict::Pass };
        assert_eq!(eng.evaluate(frame, T0), expected, "case {i}");
    }
}

#[test]
fn redirect_fail_open() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=redirect:eth-missing"), T0)
        .unwrap();

    for sport in 1..=5 {
        let f = udp_frame("10.2.3.4", sport, "10.0.0.1", 53);
        assert_eq!(eng.evaluate(&f, T0), Verdict::Pass);
    }
    assert_eq!(eng.global_stats().redirect_miss, 5);

    let t = target("eth-missing", 9);
    eng.set_redirect(t.clone()).unwrap();
    let f = udp_frame("10.2.3.4", 1, "10.0.0.1", 53);
    assert_eq!(eng.evaluate(&f, T0), Verdict::Redirect(t.egress));
}

#[test]
fn throttled_drop_rule() {
    let eng = engine();
    let id = eng
        .insert_rule(rule("prefix=10.0.0.0/8 action=drop rate=5"), T0)
        .unwrap();
    let f = syn("10.0.0.5", 80);

    for _ in 0..10 {
        assert_eq!(eng.evaluate(&f, T0), Verdict::Drop);
    }

    let snap = eng.snapshot_stats(T0);
    assert_eq!(snap.global.throttled, 5);
    assert_eq!(snap.rule(id).unwrap().packets, 10);
}

#[test]
fn throttled_pass_rule() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=pass rate=5"), T0)
        .unwrap();
    let f = syn("10.0.0.5", 80);

    let verdicts: Vec<Verdict> =
        (0..10).map(|_| eng.evaluate(&f, T0)).collect();
    assert!(verdicts[..5].iter().all(|v| *v == Verdict::Pass));
    assert!(verdicts[5..].iter().all(|v| *v == Verdict::Drop));

    // A second later the bucket is full again.
    let t1 = T0 + Duration::from_secs(1);
    assert_eq!(eng.evaluate(&f, t1), Verdict::Pass);
}

#[test]
fn expiration() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=drop expire=1"), T0)
        .unwrap();
    let f = syn("10.0.0.5", 80);

    let early = T0 + Duration::from_millis(500);
    let late = T0 + Duration::from_secs(2);
    assert_eq!(eng.evaluate(&f, early), Verdict::Drop);
    assert_eq!(eng.evaluate(&f, late), Verdict::Pass);
    assert_eq!(eng.global_stats().expired, 1);

    // Expired rules stay listed until removed.
    let rules = eng.list_rules(late);
    assert_eq!(rules.len(), 1);
    assert!(rules[0].expired);
}

#[test]
fn insert_then_remove_is_idempotent() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=drop"), T0).unwrap();
    eng.insert_rule(rule("prefix=10.1.0.0/16 action=pass proto=udp"), T0)
        .unwrap();

    let srcs = ["10.0.0.1", "10.1.2.3", "10.1.255.1", "11.0.0.1", "0.0.0.0"];
    let dports = [22, 53, 443];
    let frames: Vec<Vec<u8>> = iproduct!(srcs, dports)
        .flat_map(|(src, dport)| {
            [syn(src, dport), udp_frame(src, 1000, "10.9.9.9", dport)]
        })
        .collect();

    let before: Vec<Verdict> =
        frames.iter().map(|f| eng.evaluate(f, T0)).collect();

    for extra in [
        "prefix=10.1.2.0/24 action=drop",
        "prefix=0.0.0.0/0 action=drop",
        "prefix=10.0.0.1/32 action=pass priority=9",
        "prefix=10.0.0.0/8 action=pass priority=9",
    ] {
        let id = eng.insert_rule(rule(extra), T0).unwrap();
        let during: Vec<Verdict> =
            frames.iter().map(|f| eng.evaluate(f, T0)).collect();
        assert_ne!(before, during, "{extra} changed nothing");

        eng.remove_rule(id).unwrap();
        let after: Vec<Verdict> =
            frames.iter().map(|f| eng.evaluate(f, T0)).collect();
        assert_eq!(before, after, "removing {extra}");
    }
}

#[test]
fn malformed_frames_pass() {
    let eng = engine();
    eng.insert_rule(rule("prefix=0.0.0.0/0 action=drop"), T0).unwrap();

    let good = syn("10.0.0.5", 80);
    assert_eq!(eng.evaluate(&good, T0), Verdict::Drop);

    // Every truncation of a TCP frame short of a full TCP header.
    for len in 0..good.len() {
        assert_eq!(eng.evaluate(&good[..len], T0), Verdict::Pass, "{len}");
    }

    // ARP is not IPv4.
    let arp = ether_frame(EthernetProtocol::Arp, &[0u8; 28]);
    assert_eq!(eng.evaluate(&arp, T0), Verdict::Pass);

    let g = eng.global_stats();
    assert_eq!(g.parse_fail, good.len() as u64 + 1);
    assert_eq!(g.drop, 1);
}

#[test]
fn non_first_fragment_has_no_ports() {
    let eng = engine();
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=drop dport=80"), T0)
        .unwrap();
    eng.insert_rule(rule("prefix=10.0.0.0/16 action=drop sport=0 dport=0"), T0)
        .unwrap();

    let mut frag = syn("10.0.0.5", 80);
    make_fragment(&mut frag, 1480);
    assert_eq!(eng.evaluate(&frag, T0), Verdict::Drop);
    assert_eq!(eng.evaluate(&syn("10.0.0.5", 80), T0), Verdict::Pass);
}

#[test]
fn destination_match_field() {
    let eng = engine_with(MatchField::Dst, 16);
    eng.insert_rule(rule("prefix=192.168.0.0/16 action=drop"), T0).unwrap();

    assert_eq!(eng.evaluate(&syn("10.0.0.5", 80), T0), Verdict::Drop);
    let f = udp_frame("192.168.0.1", 1, "10.0.0.1", 2);
    assert_eq!(eng.evaluate(&f, T0), Verdict::Pass);
}

#[test]
fn capacity_is_explicit() {
    let eng = engine_with(MatchField::Src, 2);
    eng.insert_rule(rule("prefix=10.0.0.0/8 action=drop"), T0).unwrap();
    eng.insert_rule(rule("prefix=11.0.0.0/8 action=drop"), T0).unwrap();
    let err = eng.insert_rule(rule("prefix=12.0.0.0/8 action=drop"), T0);
    assert!(matches!(err, Err(SgError::CapacityExceeded { limit: 2, .. })));

    // Nothing was evicted.
    assert_eq!(eng.evaluate(&syn("10.0.0.5", 80), T0), Verdict::Drop);
    assert_eq!(eng.evaluate(&syn("11.0.0.5", 80), T0), Verdict::Drop);
    assert_eq!(eng.evaluate(&syn("12.0.0.5", 80), T0), Verdict::Pass);
}
