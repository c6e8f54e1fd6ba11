// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The classification engine.
//!
//! A packet moves through the pipeline in one pass:
//!
//! ```text
//! bytes -> packet::parse -> RuleStore::lookup -> rate_limit::check
//!       -> dispatch::resolve -> Verdict
//! ```
//!
//! with the rule's and the engine's counters updated on the way. The
//! per-packet path takes no lock that the control plane can hold for
//! longer than a pointer swap, never allocates and never logs.

pub mod dispatch;
pub mod ether;
pub mod ioctl;
pub mod ip4;
pub mod packet;
pub mod rate_limit;
pub mod redirect;
pub mod rule;
pub mod rule_store;
pub mod stat;
pub mod tcp;
pub mod udp;

use crate::api::GlobalStats;
use crate::api::Ipv4Cidr;
use crate::api::Label;
use crate::api::MAX_FILTER_RULES;
use crate::api::MatchField;
use crate::api::RedirectId;
use crate::api::RedirectTarget;
use crate::api::RuleCfg;
use crate::api::RuleDump;
use crate::api::RuleId;
use crate::api::RuleStats;
use crate::api::SgError;
use crate::api::StatsSnapshot;
use crate::api::Verdict;
use crate::ddi::time::Moment;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::provider::Providers;
use alloc::boxed::Box;
use alloc::vec::Vec;
use rate_limit::RateDecision;
use redirect::RedirectTable;
use rule_store::Lookup;
use rule_store::RuleStore;
use serde::Deserialize;
use serde::Serialize;
use stat::GlobalStat;
use stat::Miss;

/// Engine-wide settings, fixed for the life of an [`Engine`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineCfg {
    /// Which address of the packet rule prefixes are matched against.
    pub match_field: MatchField,
    pub max_rules: usize,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self { match_field: MatchField::Src, max_rules: MAX_FILTER_RULES }
    }
}

pub struct Engine {
    cfg: EngineCfg,
    rules: RuleStore,
    redirects: RedirectTable,
    stats: GlobalStat,
    log: Box<dyn LogProvider>,
}

impl Engine {
    pub fn new(cfg: EngineCfg, providers: Providers) -> Self {
        Self {
            cfg,
            rules: RuleStore::new(cfg.match_field, cfg.max_rules),
            redirects: RedirectTable::new(),
            stats: GlobalStat::new(),
            log: providers.log,
        }
    }

    pub fn cfg(&self) -> &EngineCfg {
        &self.cfg
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn redirects(&self) -> &RedirectTable {
        &self.redirects
    }

    /// Classify one frame that arrived at `now`.
    ///
    /// Every outcome that is not a definite drop or redirect is a
    /// pass: frames that fail to parse, addresses no rule covers,
    /// filter misses, expired rules and dangling redirects.
    pub fn evaluate(&self, bytes: &[u8], now: Moment) -> Verdict {
        self.stats.seen(bytes.len() as u64);
        let verdict = self.classify(bytes, now);
        self.stats.verdict(&verdict);
        verdict
    }

    fn classify(&self, bytes: &[u8], now: Moment) -> Verdict {
        let key = match packet::parse(bytes) {
            Ok(key) => key,
            Err(_) => {
                self.stats.parse_fail();
                return Verdict::Pass;
            }
        };

        let rule = match self.rules.lookup(&key, now) {
            Lookup::Hit(rule) => rule,
            Lookup::NoMatch => return self.miss(Miss::NoMatch),
            Lookup::FilterMiss => return self.miss(Miss::FilterMiss),
            Lookup::Expired => return self.miss(Miss::Expired),
        };

        self.stats.matched();
        let limit = rate_limit::check(&rule, now);
        if limit == RateDecision::Throttled {
            self.stats.throttled();
        }

        rule.stats().hit_at(key.len, now);
        let res = dispatch::resolve(Some(&rule), limit, |id| {
            self.redirects.resolve(id)
        });
        if res.redirect_miss {
            self.stats.redirect_miss();
        }
        res.verdict
    }

    fn miss(&self, miss: Miss) -> Verdict {
        self.stats.miss(miss);
        Verdict::Pass
    }

    pub fn insert_rule(
        &self,
        cfg: RuleCfg,
        now: Moment,
    ) -> Result<RuleId, SgError> {
        let desc = cfg.to_string();
        let res = self.rules.insert(cfg, now);
        match &res {
            Ok(id) => self.note(&format!("insert rule {id}: {desc}")),
            Err(e) => self.warn(&format!("insert rule {desc}: {e}")),
        }
        res
    }

    pub fn update_rule(
        &self,
        id: RuleId,
        cfg: RuleCfg,
        now: Moment,
    ) -> Result<(), SgError> {
        let desc = cfg.to_string();
        let res = self.rules.update(id, cfg, now);
        match &res {
            Ok(()) => self.note(&format!("update rule {id}: {desc}")),
            Err(e) => self.warn(&format!("update rule {id}: {e}")),
        }
        res
    }

    pub fn remove_rule(&self, id: RuleId) -> Result<(), SgError> {
        let res = self.rules.remove(id);
        match &res {
            Ok(()) => self.note(&format!("remove rule {id}")),
            Err(e) => self.warn(&format!("remove rule {id}: {e}")),
        }
        res
    }

    pub fn remove_prefix(
        &self,
        prefix: Ipv4Cidr,
    ) -> Result<Vec<RuleId>, SgError> {
        let res = self.rules.remove_prefix(prefix);
        match &res {
            Ok(ids) => self.note(&format!("remove {prefix}: rules {ids:?}")),
            Err(e) => self.warn(&format!("remove {prefix}: {e}")),
        }
        res
    }

    pub fn update_prefix(
        &self,
        prefix: Ipv4Cidr,
        cfg: RuleCfg,
        now: Moment,
    ) -> Result<RuleId, SgError> {
        let desc = cfg.to_string();
        let res = self.rules.update_prefix(prefix, cfg, now);
        match &res {
            Ok(id) => self.note(&format!("update rule {id}: {desc}")),
            Err(e) => self.warn(&format!("update {prefix}: {e}")),
        }
        res
    }

    pub fn remove_rule_by_label(
        &self,
        label: &Label,
    ) -> Result<Vec<RuleId>, SgError> {
        let res = self.rules.remove_label(label);
        match &res {
            Ok(ids) => {
                self.note(&format!("remove label {label}: rules {ids:?}"))
            }
            Err(e) => self.warn(&format!("remove label {label}: {e}")),
        }
        res
    }

    pub fn list_rules(&self, now: Moment) -> Vec<RuleDump> {
        self.rules.dump(now)
    }

    pub fn set_redirect(&self, target: RedirectTarget) -> Result<(), SgError> {
        let desc = format!("{} -> {}", target.id, target.egress);
        match self.redirects.set(target) {
            Ok(None) => {
                self.note(&format!("add redirect {desc}"));
                Ok(())
            }
            Ok(Some(old)) => {
                self.note(&format!("set redirect {desc} (was {old})"));
                Ok(())
            }
            Err(e) => {
                self.warn(&format!("set redirect {desc}: {e}"));
                Err(e)
            }
        }
    }

    pub fn update_redirect(
        &self,
        target: RedirectTarget,
    ) -> Result<(), SgError> {
        let desc = format!("{} -> {}", target.id, target.egress);
        let res = self.redirects.update(target);
        match &res {
            Ok(old) => {
                self.note(&format!("update redirect {desc} (was {old})"))
            }
            Err(e) => self.warn(&format!("update redirect {desc}: {e}")),
        }
        res.map(|_| ())
    }

    /// Remove a redirect target. Rules naming it stay in place and let
    /// their packets through until the target comes back.
    pub fn remove_redirect(&self, id: &RedirectId) -> Result<(), SgError> {
        let res = self.redirects.remove(id);
        match &res {
            Ok(old) => self.note(&format!("remove redirect {id} ({old})")),
            Err(e) => self.warn(&format!("remove redirect {id}: {e}")),
        }
        res.map(|_| ())
    }

    pub fn list_redirects(&self) -> Vec<RedirectTarget> {
        self.redirects.dump()
    }

    pub fn global_stats(&self) -> GlobalStats {
        GlobalStats::from(&self.stats)
    }

    /// Read every counter. Evaluations in flight may or may not be
    /// reflected; nothing waits on them.
    pub fn snapshot_stats(&self, now: Moment) -> StatsSnapshot {
        let rules: Vec<(RuleId, RuleStats)> = self
            .rules
            .rules()
            .iter()
            .map(|r| (r.id(), r.stats().into()))
            .collect();

        StatsSnapshot {
            taken_at: now.raw(),
            global: self.global_stats(),
            rules,
        }
    }

    fn note(&self, msg: &str) {
        self.log.log(LogLevel::Note, msg);
    }

    fn warn(&self, msg: &str) {
        self.log.log(LogLevel::Warn, msg);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Egress;
    use crate::api::Table;
    use crate::provider::RecordLog;
    use alloc::sync::Arc;

    // Ethernet + IPv4 + UDP from 10.0.0.5:5000 to 10.9.9.9:53.
    fn udp_frame() -> Vec<u8> {
        let mut f = vec![0u8; 14 + 20 + 8];
        f[12..14].copy_from_slice(&[0x08, 0x00]);
        f[14] = 0x45;
        f[16..18].copy_from_slice(&28u16.to_be_bytes());
        f[22] = 64;
        f[23] = 17;
        f[26..30].copy_from_slice(&[10, 0, 0, 5]);
        f[30..34].copy_from_slice(&[10, 9, 9, 9]);
        f[34..36].copy_from_slice(&5000u16.to_be_bytes());
        f[36..38].copy_from_slice(&53u16.to_be_bytes());
        f[38..40].copy_from_slice(&8u16.to_be_bytes());
        f
    }

    fn engine() -> (Engine, Arc<RecordLog>) {
        let log = Arc::new(RecordLog::new());
        let providers = Providers { log: Box::new(log.clone()) };
        (Engine::new(EngineCfg::default(), providers), log)
    }

    fn cfg(s: &str) -> RuleCfg {
        s.parse().unwrap()
    }

    #[test]
    fn pipeline_counts() {
        let (eng, _) = engine();
        let t = Moment::from_secs(1);
        let frame = udp_frame();

        assert_eq!(eng.evaluate(&frame, t), Verdict::Pass);
        assert_eq!(eng.evaluate(&frame[..20], t), Verdict::Pass);

        let id = eng.insert_rule(cfg("prefix=10.0.0.0/8 action=drop"), t);
        let id = id.unwrap();
        assert_eq!(eng.evaluate(&frame, t), Verdict::Drop);

        let g = eng.global_stats();
        assert_eq!(g.packets, 3);
        assert_eq!(g.bytes, 42 + 20 + 42);
        assert_eq!(g.parse_fail, 1);
        assert_eq!(g.no_match, 1);
        assert_eq!(g.matched, 1);
        assert_eq!((g.pass, g.drop), (2, 1));

        let snap = eng.snapshot_stats(t);
        assert_eq!(snap.taken_at, t.raw());
        let rs = snap.rule(id).unwrap();
        assert_eq!((rs.packets, rs.bytes), (1, 42));
        assert_eq!(rs.last_matched, Some(t.raw()));
    }

    #[test]
    fn redirect_and_fail_open() {
        let (eng, _) = engine();
        let t = Moment::from_secs(1);
        let frame = udp_frame();
        let id = eng
            .insert_rule(cfg("prefix=10.0.0.0/8 action=redirect:mirror"), t)
            .unwrap();

        assert_eq!(eng.evaluate(&frame, t), Verdict::Pass);
        assert_eq!(eng.global_stats().redirect_miss, 1);

        let egress = Egress::new(3, "eth3").unwrap();
        let target = RedirectTarget {
            id: "mirror".parse().unwrap(),
            egress: egress.clone(),
        };
        eng.set_redirect(target.clone()).unwrap();
        assert_eq!(eng.evaluate(&frame, t), Verdict::Redirect(egress));

        eng.remove_redirect(&target.id).unwrap();
        assert_eq!(eng.evaluate(&frame, t), Verdict::Pass);

        // Every one of those counted against the rule.
        let snap = eng.snapshot_stats(t);
        assert_eq!(snap.rule(id).unwrap().packets, 3);
        assert_eq!(snap.global.redirect_miss, 2);
        assert_eq!(snap.global.redirect, 1);
    }

    #[test]
    fn control_plane_logs() {
        let (eng, log) = engine();
        let t = Moment::from_secs(1);
        let id = eng.insert_rule(cfg("prefix=10.0.0.0/8 action=drop"), t);
        eng.remove_rule(id.unwrap()).unwrap();
        assert_eq!(eng.remove_rule(42), Err(SgError::RuleNotFound(42)));

        let msgs = log.take();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].0, LogLevel::Note);
        assert!(msgs[0].1.starts_with("insert rule 1"));
        assert_eq!(msgs[2].0, LogLevel::Warn);
    }

    #[test]
    fn engine_cfg_limits_rules() {
        let cfg_small = EngineCfg { max_rules: 1, ..Default::default() };
        let eng = Engine::new(cfg_small, Providers::default());
        let t = Moment::from_secs(0);
        eng.insert_rule(cfg("prefix=10.0.0.0/8 action=drop"), t).unwrap();
        assert_eq!(
            eng.insert_rule(cfg("prefix=11.0.0.0/8 action=drop"), t),
            Err(SgError::CapacityExceeded { table: Table::Rules, limit: 1 })
        );
    }
}
