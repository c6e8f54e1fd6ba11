// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print command responses in human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both sgadm and integration tests.

use crate::api::ListRedirectsResp;
use crate::api::ListRulesResp;
use crate::api::RuleDump;
use crate::api::RuleStats;
use crate::api::StatsSnapshot;
use crate::api::Throughput;
use std::io::Write;
use std::string::String;
use std::string::ToString;
use tabwriter::TabWriter;

/// Print a [`ListRulesResp`].
pub fn print_rules(resp: &ListRulesResp, stats: bool) -> std::io::Result<()> {
    print_rules_into(&mut std::io::stdout(), resp, stats)
}

/// Print a [`ListRulesResp`] into a given writer, optionally with each
/// rule's counters.
pub fn print_rules_into(
    writer: &mut impl Write,
    resp: &ListRulesResp,
    stats: bool,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(
        t,
        "Rules: {}/{} (matching {} address)",
        resp.rules.len(),
        resp.limit,
        resp.match_field
    )?;
    write_hr(&mut t)?;
    print_rule_header(&mut t, stats)?;
    for rule in &resp.rules {
        print_rule(&mut t, rule, stats)?;
    }
    t.flush()
}

/// Print the header for the [`print_rule()`] output.
pub fn print_rule_header(
    t: &mut impl Write,
    stats: bool,
) -> std::io::Result<()> {
    write!(
        t,
        "ID\tPRI\tPREFIX\tACTION\tPROTO\tSPORT\tDPORT\tFLAGS\tRATE\tEXPIRE\t\
         LABEL"
    )?;
    if stats {
        write!(t, "\tPKTS\tBYTES\tLAST MATCH")?;
    }
    writeln!(t)
}

/// Print a [`RuleDump`].
pub fn print_rule(
    t: &mut impl Write,
    rule: &RuleDump,
    stats: bool,
) -> std::io::Result<()> {
    let cfg = &rule.cfg;
    let rate = match cfg.rate_limit {
        0 => "--".to_string(),
        r => format!("{r}/s"),
    };
    let expire = match (cfg.expire_after, rule.expired) {
        (0, _) => "--".to_string(),
        (secs, false) => format!("{secs}s"),
        (secs, true) => format!("{secs}s (expired)"),
    };
    let label = cfg.label.as_ref().map(|l| l.as_str()).unwrap_or("--");

    write!(
        t,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        rule.id,
        cfg.priority,
        cfg.prefix,
        cfg.action,
        cfg.proto,
        cfg.src_ports,
        cfg.dst_ports,
        cfg.tcp_flags,
        rate,
        expire,
        label,
    )?;

    if stats {
        let RuleStats { packets, bytes, last_matched } = rule.stats;
        write!(t, "\t{packets}\t{bytes}\t{}", fmt_moment(last_matched))?;
    }
    writeln!(t)
}

/// Print a [`ListRedirectsResp`].
pub fn print_redirects(resp: &ListRedirectsResp) -> std::io::Result<()> {
    print_redirects_into(&mut std::io::stdout(), resp)
}

/// Print a [`ListRedirectsResp`] into a given writer.
pub fn print_redirects_into(
    writer: &mut impl Write,
    resp: &ListRedirectsResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Redirects: {}/{}", resp.targets.len(), resp.limit)?;
    write_hr(&mut t)?;
    writeln!(t, "ID\tIFNAME\tIFINDEX")?;
    for target in &resp.targets {
        writeln!(
            t,
            "{}\t{}\t{}",
            target.id, target.egress.ifname, target.egress.ifindex
        )?;
    }
    t.flush()
}

/// Print a [`StatsSnapshot`].
pub fn print_stats(snap: &StatsSnapshot) -> std::io::Result<()> {
    print_stats_into(&mut std::io::stdout(), snap)
}

/// Print a [`StatsSnapshot`] into a given writer.
pub fn print_stats_into(
    writer: &mut impl Write,
    snap: &StatsSnapshot,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    let g = &snap.global;

    writeln!(t, "Global")?;
    write_hrb(&mut t)?;
    writeln!(t, "PACKETS\tBYTES\tPASS\tDROP\tREDIRECT")?;
    writeln!(
        t,
        "{}\t{}\t{}\t{}\t{}",
        g.packets, g.bytes, g.pass, g.drop, g.redirect
    )?;
    t.flush()?;

    writeln!(t)?;
    writeln!(
        t,
        "MATCHED\tPARSE FAIL\tNO MATCH\tFILTER MISS\tEXPIRED\tTHROTTLED\t\
         REDIRECT MISS"
    )?;
    writeln!(
        t,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        g.matched,
        g.parse_fail,
        g.no_match,
        g.filter_miss,
        g.expired,
        g.throttled,
        g.redirect_miss,
    )?;
    t.flush()?;

    writeln!(t, "\nRules")?;
    write_hrb(&mut t)?;
    writeln!(t, "ID\tPKTS\tBYTES\tLAST MATCH")?;
    for (id, rs) in &snap.rules {
        writeln!(
            t,
            "{id}\t{}\t{}\t{}",
            rs.packets,
            rs.bytes,
            fmt_moment(rs.last_matched)
        )?;
    }
    t.flush()
}

/// Print the rates between two snapshots.
pub fn print_throughput_into(
    writer: &mut impl Write,
    prev: &StatsSnapshot,
    cur: &StatsSnapshot,
) -> std::io::Result<()> {
    writeln!(writer, "{}", Throughput::between(prev, cur))
}

// Monotonic nanoseconds, shown as seconds since the engine's epoch.
fn fmt_moment(raw: Option<u64>) -> String {
    match raw {
        Some(ns) => {
            format!("{}.{:03}s", ns / 1_000_000_000, ns / 1_000_000 % 1000)
        }
        None => "never".to_string(),
    }
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Egress;
    use crate::api::GlobalStats;
    use crate::api::MatchField;
    use crate::api::RedirectTarget;

    fn rules_resp() -> ListRulesResp {
        let cfg = "prefix=10.0.0.0/8 action=drop priority=4 proto=tcp \
                   dport=22 flags=syn rate=5 expire=60 label=ssh"
            .parse()
            .unwrap();
        ListRulesResp {
            match_field: MatchField::Src,
            limit: 16,
            rules: vec![RuleDump {
                id: 3,
                cfg,
                created_at: 0,
                expired: true,
                stats: RuleStats {
                    packets: 2,
                    bytes: 128,
                    last_matched: Some(1_500_000_000),
                },
            }],
        }
    }

    #[test]
    fn rules_table() {
        let mut out = Vec::new();
        print_rules_into(&mut out, &rules_resp(), true).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "Rules: 1/16 (matching src address)");
        assert!(lines[2].starts_with("ID"));
        assert!(lines[2].ends_with("LAST MATCH"));
        let cols: Vec<&str> = lines[3].split_whitespace().collect();
        assert_eq!(
            cols,
            [
                "3", "4", "10.0.0.0/8", "drop", "tcp", "0-65535", "22", "syn",
                "5/s", "60s", "(expired)", "ssh", "2", "128", "1.500s"
            ]
        );
    }

    #[test]
    fn rules_table_without_stats() {
        let mut out = Vec::new();
        print_rules_into(&mut out, &rules_resp(), false).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(!out.contains("PKTS"));
        assert!(out.lines().nth(3).unwrap().trim_end().ends_with("ssh"));
    }

    #[test]
    fn redirects_table() {
        let resp = ListRedirectsResp {
            limit: 64,
            targets: vec![RedirectTarget {
                id: "mirror".parse().unwrap(),
                egress: Egress::new(4, "eth1").unwrap(),
            }],
        };
        let mut out = Vec::new();
        print_redirects_into(&mut out, &resp).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Redirects: 1/64\n"));
        let last = out.lines().last().unwrap();
        assert_eq!(
            last.split_whitespace().collect::<Vec<_>>(),
            ["mirror", "eth1", "4"]
        );
    }

    #[test]
    fn stats_table() {
        let snap = StatsSnapshot {
            taken_at: 0,
            global: GlobalStats { packets: 10, drop: 4, ..Default::default() },
            rules: vec![(1, RuleStats::default())],
        };
        let mut out = Vec::new();
        print_stats_into(&mut out, &snap).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("THROTTLED"));
        let last = out.lines().last().unwrap();
        assert_eq!(
            last.split_whitespace().collect::<Vec<_>>(),
            ["1", "0", "0", "never"]
        );
    }
}
