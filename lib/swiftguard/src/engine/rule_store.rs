// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The rule store: filter rules indexed by longest prefix match.
//!
//! There are two representations of the rule set. The `BTreeMap`
//! keyed by rule id is the authoritative copy, and is what the
//! control plane edits. The [`LpmTrie`] is what packets are matched
//! against. It is not updated in place; every mutation builds a fresh
//! trie from the map and swaps it in under a write lock held only for
//! the swap. A lookup clones the current `Arc` and walks a trie that
//! nothing else will ever modify.

use super::packet::FlowKey;
use super::rule::FilterRule;
use crate::api::Ipv4Addr;
use crate::api::Ipv4Cidr;
use crate::api::Label;
use crate::api::MatchField;
use crate::api::RuleCfg;
use crate::api::RuleDump;
use crate::api::RuleId;
use crate::api::SgError;
use crate::api::Table;
use crate::ddi::sync::KMutex;
use crate::ddi::sync::KMutexGuard;
use crate::ddi::sync::KRwLock;
use crate::ddi::time::Moment;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

const ROOT: usize = 0;

#[derive(Debug, Default)]
struct Node {
    children: [Option<u32>; 2],
    // The best-ranked rule stored at exactly this prefix.
    rule: Option<Arc<FilterRule>>,
}

/// A binary trie over IPv4 prefixes, walked from the most significant
/// bit. Nodes live in a single arena and refer to their children by
/// index.
#[derive(Debug)]
pub struct LpmTrie {
    nodes: Vec<Node>,
}

impl Default for LpmTrie {
    fn default() -> Self {
        Self { nodes: vec![Node::default()] }
    }
}

impl LpmTrie {
    pub fn build<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<FilterRule>>,
    {
        let mut trie = Self::default();
        for rule in rules {
            trie.add(rule);
        }
        trie
    }

    fn add(&mut self, rule: &Arc<FilterRule>) {
        let (ip, prefix_len) = rule.cfg().prefix.parts();
        let mut cur = ROOT;

        for depth in 0..prefix_len.val() {
            let bit = usize::from(ip.bit(depth));
            cur = match self.nodes[cur].children[bit] {
                Some(next) => next as usize,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[cur].children[bit] = Some(next as u32);
                    next
                }
            };
        }

        let slot = &mut self.nodes[cur].rule;
        match slot {
            Some(held) if held.rank(rule).is_le() => (),
            _ => *slot = Some(rule.clone()),
        }
    }

    /// Find the rule stored at the longest prefix covering `addr`.
    ///
    /// The walk visits at most one node per address bit.
    pub fn longest_match(&self, addr: Ipv4Addr) -> Option<&Arc<FilterRule>> {
        let mut cur = ROOT;
        let mut best = self.nodes[ROOT].rule.as_ref();

        for depth in 0..32 {
            let bit = usize::from(addr.bit(depth));
            let Some(next) = self.nodes[cur].children[bit] else {
                break;
            };
            cur = next as usize;
            if let Some(rule) = self.nodes[cur].rule.as_ref() {
                best = Some(rule);
            }
        }

        best
    }

    /// The number of nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// The outcome of matching one packet against the store.
#[derive(Clone, Debug)]
pub enum Lookup {
    /// No stored prefix covers the packet's address.
    NoMatch,
    /// The best candidate rejected the packet on protocol, port or
    /// flags.
    FilterMiss,
    /// The best candidate matched but has expired.
    Expired,
    Hit(Arc<FilterRule>),
}

impl Lookup {
    pub fn hit(&self) -> Option<&Arc<FilterRule>> {
        match self {
            Self::Hit(rule) => Some(rule),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: RuleId,
    by_id: BTreeMap<RuleId, Arc<FilterRule>>,
}

impl StoreState {
    fn ids_at(&self, prefix: Ipv4Cidr) -> Vec<RuleId> {
        self.by_id
            .values()
            .filter(|r| r.cfg().prefix == prefix)
            .map(|r| r.id())
            .collect()
    }

    // The rule a lookup would see at exactly `prefix`.
    fn top_at(&self, prefix: Ipv4Cidr) -> Option<&Arc<FilterRule>> {
        self.by_id
            .values()
            .filter(|r| r.cfg().prefix == prefix)
            .min_by(|a, b| a.rank(b))
    }
}

pub struct RuleStore {
    field: MatchField,
    limit: usize,
    state: KMutex<StoreState>,
    trie: KRwLock<Arc<LpmTrie>>,
}

impl RuleStore {
    pub fn new(field: MatchField, limit: usize) -> Self {
        Self {
            field,
            limit,
            state: KMutex::new(StoreState { next_id: 1, ..Default::default() }),
            trie: KRwLock::new(Arc::new(LpmTrie::default())),
        }
    }

    pub fn match_field(&self) -> MatchField {
        self.field
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.state.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The trie currently used for lookups.
    pub fn snapshot(&self) -> Arc<LpmTrie> {
        self.trie.read().clone()
    }

    /// Match `key` against the store at `now`.
    ///
    /// The deepest covering prefix decides. Its best-ranked rule is
    /// the only candidate: if the secondary filters reject the packet,
    /// or the rule has expired, there is no match and shorter prefixes
    /// are not consulted.
    pub fn lookup(&self, key: &FlowKey, now: Moment) -> Lookup {
        let trie = self.snapshot();
        let Some(rule) = trie.longest_match(key.addr(self.field)) else {
            return Lookup::NoMatch;
        };

        if !rule.matches_filters(key) {
            return Lookup::FilterMiss;
        }

        if rule.is_expired(now) {
            return Lookup::Expired;
        }

        Lookup::Hit(rule.clone())
    }

    pub fn insert(&self, cfg: RuleCfg, now: Moment) -> Result<RuleId, SgError> {
        let mut state = self.state.lock();
        if state.by_id.len() >= self.limit {
            return Err(SgError::CapacityExceeded {
                table: Table::Rules,
                limit: self.limit as u64,
            });
        }

        let id = state.next_id;
        let rule = FilterRule::new(id, cfg, now)?;
        state.next_id += 1;
        state.by_id.insert(id, Arc::new(rule));
        self.rebuild(&state);
        Ok(id)
    }

    pub fn update(
        &self,
        id: RuleId,
        cfg: RuleCfg,
        now: Moment,
    ) -> Result<(), SgError> {
        let mut state = self.state.lock();
        let Some(old) = state.by_id.get(&id) else {
            return Err(SgError::RuleNotFound(id));
        };

        let new = old.replace(cfg, now)?;
        state.by_id.insert(id, Arc::new(new));
        self.rebuild(&state);
        Ok(())
    }

    pub fn remove(&self, id: RuleId) -> Result<(), SgError> {
        let mut state = self.state.lock();
        if state.by_id.remove(&id).is_none() {
            return Err(SgError::RuleNotFound(id));
        }
        self.rebuild(&state);
        Ok(())
    }

    /// Remove every rule stored at exactly `prefix`.
    pub fn remove_prefix(
        &self,
        prefix: Ipv4Cidr,
    ) -> Result<Vec<RuleId>, SgError> {
        let mut state = self.state.lock();
        let ids = state.ids_at(prefix);
        if ids.is_empty() {
            return Err(SgError::PrefixNotFound(prefix));
        }

        for id in &ids {
            state.by_id.remove(id);
        }
        self.rebuild(&state);
        Ok(ids)
    }

    /// Replace the rule a lookup would select at exactly `prefix`.
    /// The new configuration must keep the prefix.
    pub fn update_prefix(
        &self,
        prefix: Ipv4Cidr,
        cfg: RuleCfg,
        now: Moment,
    ) -> Result<RuleId, SgError> {
        let mut state = self.state.lock();
        let Some(old) = state.top_at(prefix) else {
            return Err(SgError::PrefixNotFound(prefix));
        };

        if cfg.prefix != prefix {
            return Err(SgError::InvalidRule(format!(
                "update of {prefix} cannot move the rule to {}",
                cfg.prefix
            )));
        }

        let id = old.id();
        let new = old.replace(cfg, now)?;
        state.by_id.insert(id, Arc::new(new));
        self.rebuild(&state);
        Ok(id)
    }

    /// Remove every rule carrying `label`.
    pub fn remove_label(&self, label: &Label) -> Result<Vec<RuleId>, SgError> {
        let mut state = self.state.lock();
        let ids: Vec<RuleId> = state
            .by_id
            .values()
            .filter(|r| r.cfg().label.as_ref() == Some(label))
            .map(|r| r.id())
            .collect();

        if ids.is_empty() {
            return Err(SgError::LabelNotFound(label.clone()));
        }

        for id in &ids {
            state.by_id.remove(id);
        }
        self.rebuild(&state);
        Ok(ids)
    }

    pub fn get(&self, id: RuleId) -> Option<Arc<FilterRule>> {
        self.state.lock().by_id.get(&id).cloned()
    }

    /// All rules, in id order.
    pub fn rules(&self) -> Vec<Arc<FilterRule>> {
        self.state.lock().by_id.values().cloned().collect()
    }

    pub fn dump(&self, now: Moment) -> Vec<RuleDump> {
        self.state.lock().by_id.values().map(|r| r.dump(now)).collect()
    }

    fn rebuild(&self, state: &KMutexGuard<StoreState>) {
        let trie = LpmTrie::build(state.by_id.values());
        *self.trie.write() = Arc::new(trie);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FilterAction;
    use crate::api::TcpFlags;
    use core::time::Duration;

    fn store() -> RuleStore {
        RuleStore::new(MatchField::Src, 16)
    }

    fn cfg(s: &str) -> RuleCfg {
        s.parse().unwrap()
    }

    fn key(src: &str, dport: u16) -> FlowKey {
        FlowKey {
            src_ip: src.parse().unwrap(),
            dst_ip: "192.168.0.1".parse().unwrap(),
            src_port: 40000,
            dst_port: dport,
            proto: 6,
            tcp_flags: TcpFlags::ACK,
            len: 64,
        }
    }

    fn action(l: &Lookup) -> Option<FilterAction> {
        l.hit().map(|r| r.cfg().action.clone())
    }

    #[test]
    fn longest_prefix_beats_priority() {
        let s = store();
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=10.0.0.0/8 action=pass priority=100"), t)
            .unwrap();
        s.insert(cfg("prefix=10.0.0.0/24 action=drop priority=1"), t)
            .unwrap();

        let l = s.lookup(&key("10.0.0.5", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Drop));
        let l = s.lookup(&key("10.9.0.5", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Pass));
        assert!(matches!(s.lookup(&key("11.0.0.5", 80), t), Lookup::NoMatch));
    }

    #[test]
    fn priority_then_insertion_order() {
        let s = store();
        let t = Moment::from_secs(0);
        let low = s
            .insert(cfg("prefix=10.0.0.0/8 action=pass priority=1"), t)
            .unwrap();
        let first = s
            .insert(cfg("prefix=10.0.0.0/8 action=drop priority=5"), t)
            .unwrap();
        let _second = s
            .insert(cfg("prefix=10.0.0.0/8 action=count priority=5"), t)
            .unwrap();

        let l = s.lookup(&key("10.1.1.1", 80), t);
        assert_eq!(l.hit().map(|r| r.id()), Some(first));

        s.remove(first).unwrap();
        let l = s.lookup(&key("10.1.1.1", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Count));
        assert_ne!(l.hit().map(|r| r.id()), Some(low));
    }

    #[test]
    fn no_fallback_after_filter_miss() {
        let s = store();
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=10.0.0.0/8 action=drop dport=443"), t).unwrap();
        s.insert(cfg("prefix=10.0.0.0/24 action=drop dport=22"), t).unwrap();

        assert!(matches!(
            s.lookup(&key("10.0.0.5", 443), t),
            Lookup::FilterMiss
        ));
        assert!(s.lookup(&key("10.0.0.5", 22), t).hit().is_some());
        assert!(s.lookup(&key("10.0.1.5", 443), t).hit().is_some());
    }

    #[test]
    fn no_fallback_after_expiry() {
        let s = store();
        let t0 = Moment::from_secs(10);
        s.insert(cfg("prefix=0.0.0.0/0 action=drop"), t0).unwrap();
        s.insert(cfg("prefix=10.0.0.0/24 action=drop expire=1"), t0)
            .unwrap();

        let k = key("10.0.0.5", 80);
        let early = t0 + Duration::from_millis(500);
        assert!(s.lookup(&k, early).hit().is_some());
        let late = t0 + Duration::from_secs(2);
        assert!(matches!(s.lookup(&k, late), Lookup::Expired));
        // Still stored until removed.
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn default_route_and_host_route() {
        let s = store();
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=0.0.0.0/0 action=count"), t).unwrap();
        s.insert(cfg("prefix=10.0.0.5/32 action=drop"), t).unwrap();

        let l = s.lookup(&key("10.0.0.5", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Drop));
        let l = s.lookup(&key("10.0.0.6", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Count));
        let l = s.lookup(&key("255.255.255.255", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Count));
    }

    #[test]
    fn dst_match_field() {
        let s = RuleStore::new(MatchField::Dst, 4);
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=192.168.0.0/16 action=drop"), t).unwrap();
        assert!(s.lookup(&key("10.0.0.5", 80), t).hit().is_some());

        let s = store();
        s.insert(cfg("prefix=192.168.0.0/16 action=drop"), t).unwrap();
        assert!(s.lookup(&key("10.0.0.5", 80), t).hit().is_none());
    }

    #[test]
    fn capacity() {
        let s = RuleStore::new(MatchField::Src, 2);
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=10.0.0.0/8 action=drop"), t).unwrap();
        s.insert(cfg("prefix=11.0.0.0/8 action=drop"), t).unwrap();
        let err = s.insert(cfg("prefix=12.0.0.0/8 action=drop"), t);
        assert_eq!(
            err,
            Err(SgError::CapacityExceeded { table: Table::Rules, limit: 2 })
        );
        // Nothing was evicted.
        assert_eq!(s.len(), 2);
        assert!(s.lookup(&key("10.0.0.1", 80), t).hit().is_some());
    }

    #[test]
    fn invalid_rule_never_stored() {
        let s = store();
        let t = Moment::from_secs(0);
        let mut bad = cfg("prefix=10.0.0.0/8 action=drop proto=udp");
        bad.tcp_flags = TcpFlags::SYN;
        assert!(matches!(s.insert(bad, t), Err(SgError::InvalidRule(_))));
        assert!(s.is_empty());
    }

    #[test]
    fn update_swaps_whole_record() {
        let s = store();
        let t = Moment::from_secs(0);
        let id = s.insert(cfg("prefix=10.0.0.0/8 action=drop"), t).unwrap();
        let before = s.snapshot();

        s.update(id, cfg("prefix=10.0.0.0/8 action=pass"), t).unwrap();
        let l = s.lookup(&key("10.0.0.1", 80), t);
        assert_eq!(action(&l), Some(FilterAction::Pass));

        // A reader holding the old trie still sees the old record.
        let old = before.longest_match("10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(old.cfg().action, FilterAction::Drop);

        assert_eq!(
            s.update(99, cfg("prefix=10.0.0.0/8 action=pass"), t),
            Err(SgError::RuleNotFound(99))
        );
    }

    #[test]
    fn update_can_move_prefix() {
        let s = store();
        let t = Moment::from_secs(0);
        let id = s.insert(cfg("prefix=10.0.0.0/8 action=drop"), t).unwrap();
        s.update(id, cfg("prefix=172.16.0.0/12 action=drop"), t).unwrap();
        assert!(s.lookup(&key("10.0.0.1", 80), t).hit().is_none());
        assert!(s.lookup(&key("172.16.0.1", 80), t).hit().is_some());
    }

    #[test]
    fn prefix_addressed_ops() {
        let s = store();
        let t = Moment::from_secs(0);
        let p: Ipv4Cidr = "10.0.0.0/8".parse().unwrap();
        let a = s.insert(cfg("prefix=10.0.0.0/8 action=drop"), t).unwrap();
        let b = s
            .insert(cfg("prefix=10.0.0.0/8 action=drop priority=3"), t)
            .unwrap();
        s.insert(cfg("prefix=10.0.0.0/9 action=drop"), t).unwrap();

        let upd = s
            .update_prefix(p, cfg("prefix=10.0.0.0/8 action=count"), t)
            .unwrap();
        assert_eq!(upd, b);
        assert!(matches!(
            s.update_prefix(p, cfg("prefix=10.0.0.0/9 action=count"), t),
            Err(SgError::InvalidRule(_))
        ));

        let mut removed = s.remove_prefix(p).unwrap();
        removed.sort();
        assert_eq!(removed, vec![a, b]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.remove_prefix(p), Err(SgError::PrefixNotFound(p)));
    }

    #[test]
    fn remove_by_label() {
        let s = store();
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=10.0.0.0/8 action=drop label=lab"), t).unwrap();
        s.insert(cfg("prefix=11.0.0.0/8 action=drop label=lab"), t).unwrap();
        s.insert(cfg("prefix=12.0.0.0/8 action=drop"), t).unwrap();

        let lab: Label = "lab".parse().unwrap();
        assert_eq!(s.remove_label(&lab).unwrap().len(), 2);
        assert_eq!(s.len(), 1);
        assert_eq!(s.remove_label(&lab), Err(SgError::LabelNotFound(lab)));
    }

    #[test]
    fn insert_then_remove_restores_lookups() {
        let s = store();
        let t = Moment::from_secs(0);
        s.insert(cfg("prefix=10.0.0.0/8 action=pass"), t).unwrap();
        s.insert(cfg("prefix=10.1.0.0/16 action=drop dport=22"), t)
            .unwrap();

        let addrs = ["10.0.0.1", "10.1.2.3", "10.1.255.1", "9.9.9.9"];
        let keys: Vec<FlowKey> = addrs
            .iter()
            .flat_map(|ip| [key(ip, 22), key(ip, 80)])
            .collect();
        let ids = |s: &RuleStore| -> Vec<Option<RuleId>> {
            keys.iter()
                .map(|k| s.lookup(k, t).hit().map(|r| r.id()))
                .collect()
        };

        let before = ids(&s);
        let nodes = s.snapshot().node_count();
        let id = s.insert(cfg("prefix=10.1.2.0/24 action=drop"), t).unwrap();
        assert_ne!(ids(&s), before);
        s.remove(id).unwrap();
        assert_eq!(ids(&s), before);
        assert_eq!(s.snapshot().node_count(), nodes);
    }

    #[test]
    fn trie_walk_is_bounded() {
        let mut rules = Vec::new();
        let t = Moment::from_secs(0);
        for len in 0..=32u8 {
            let prefix = Ipv4Cidr::new_checked(Ipv4Addr::LOCAL_BCAST, len)
                .unwrap();
            let rule = FilterRule::new(
                u64::from(len),
                RuleCfg::new(prefix, FilterAction::Drop),
                t,
            )
            .unwrap();
            rules.push(Arc::new(rule));
        }

        let trie = LpmTrie::build(&rules);
        assert_eq!(trie.node_count(), 33);
        let best = trie.longest_match(Ipv4Addr::LOCAL_BCAST).unwrap();
        assert_eq!(best.cfg().prefix.prefix_len(), 32);
        let best = trie.longest_match("127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(best.cfg().prefix.prefix_len(), 0);
    }
}
