// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Filter rule configuration as the control plane sees it.

use super::ip::Ipv4Cidr;
use super::ip::Protocol;
use super::redirect::NAME_MAX;
use super::redirect::RedirectId;
use super::redirect::bounded_name;
use super::stat::RuleStats;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// Identifies a rule for the lifetime of an engine.
pub type RuleId = u64;

/// The default number of rules a rule store will accept.
pub const MAX_FILTER_RULES: usize = 10240;

/// Which address of a packet the rule store matches prefixes against.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    #[default]
    Src,
    Dst,
}

impl FromStr for MatchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "src" => Ok(Self::Src),
            "dst" => Ok(Self::Dst),
            _ => Err(format!("invalid match field: {s} ('src' or 'dst')")),
        }
    }
}

impl Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Src => write!(f, "src"),
            Self::Dst => write!(f, "dst"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FilterAction {
    Pass,
    Drop,
    /// Steer matching traffic to the named redirect target. The
    /// target need not exist; a dangling name fails open at
    /// evaluation time.
    Redirect(RedirectId),
    /// Account for the packet but otherwise let it pass.
    Count,
}

impl FromStr for FilterAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, arg) = match s.split_once(':') {
            None => (s, None),
            Some((lhs, rhs)) => (lhs, Some(rhs)),
        };

        match (ty.to_ascii_lowercase().as_str(), arg) {
            ("pass", None) => Ok(Self::Pass),
            ("drop", None) => Ok(Self::Drop),
            ("count", None) => Ok(Self::Count),
            ("redirect", Some(id)) => Ok(Self::Redirect(id.parse()?)),
            ("redirect", None) => {
                Err("redirect requires a target ('redirect:<id>')".to_string())
            }
            _ => Err(format!(
                "invalid action: {s} ('pass', 'drop', 'count' or \
                 'redirect:<id>')"
            )),
        }
    }
}

impl Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Drop => write!(f, "drop"),
            Self::Redirect(id) => write!(f, "redirect:{id}"),
            Self::Count => write!(f, "count"),
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub enum ProtoFilter {
    #[default]
    Any,
    Exact(Protocol),
}

impl ProtoFilter {
    pub fn matches(&self, proto: u8) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(p) => u8::from(*p) == proto,
        }
    }
}

impl FromStr for ProtoFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            other => Ok(Self::Exact(other.parse()?)),
        }
    }
}

impl Display for ProtoFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Exact(p) => write!(f, "{p}"),
        }
    }
}

/// An inclusive port range. `min <= max` always holds for a range
/// built through [`PortRange::new`] or parsed from a string.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub const ANY: Self = Self { min: 0, max: u16::MAX };

    pub fn new(min: u16, max: u16) -> Result<Self, String> {
        if min > max {
            return Err(format!("inverted port range: {min}-{max}"));
        }
        Ok(Self { min, max })
    }

    pub fn single(port: u16) -> Self {
        Self { min: port, max: port }
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    #[inline]
    pub fn contains(&self, port: u16) -> bool {
        self.min <= port && port <= self.max
    }

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    /// A range that arrived by deserialization has not been through
    /// `new()`.
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::ANY
    }
}

impl FromStr for PortRange {
    type Err = String;

    /// Parse either a single port ("80") or an inclusive range
    /// ("1024-2048").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let port = |p: &str| {
            p.trim().parse::<u16>().map_err(|e| format!("bad port: '{p}' {e}"))
        };

        match s.split_once('-') {
            None => Ok(Self::single(port(s)?)),
            Some((lo, hi)) => Self::new(port(lo)?, port(hi)?),
        }
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

bitflags! {
    /// The TCP control bits we classify on. The bit values line up
    /// with the low six bits of the TCP flags octet.
    #[derive(
        Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq,
        Serialize,
    )]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

impl TcpFlags {
    /// Does `pkt` carry every flag in `self`? Extra flags are fine.
    #[inline]
    pub fn subset_of(&self, pkt: TcpFlags) -> bool {
        pkt.contains(*self)
    }
}

impl FromStr for TcpFlags {
    type Err = String;

    /// Parse a comma separated list, e.g. "syn,ack".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = TcpFlags::empty();

        if s.eq_ignore_ascii_case("none") {
            return Ok(flags);
        }

        for name in s.split(',') {
            flags |= match name.trim().to_ascii_lowercase().as_str() {
                "fin" => TcpFlags::FIN,
                "syn" => TcpFlags::SYN,
                "rst" => TcpFlags::RST,
                "psh" => TcpFlags::PSH,
                "ack" => TcpFlags::ACK,
                "urg" => TcpFlags::URG,
                _ => return Err(format!("invalid TCP flag: {name}")),
            };
        }

        Ok(flags)
    }
}

impl Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let names: Vec<&str> = self
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        write!(f, "{}", names.join(",").to_ascii_lowercase())
    }
}

/// A short human-readable tag attached to a rule.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "heapless::String<NAME_MAX>")]
pub struct Label(heapless::String<NAME_MAX>);

impl TryFrom<heapless::String<NAME_MAX>> for Label {
    type Error = String;

    fn try_from(val: heapless::String<NAME_MAX>) -> Result<Self, Self::Error> {
        Self::new(val.as_str())
    }
}

impl Label {
    pub fn new(val: &str) -> Result<Self, String> {
        bounded_name("label", val).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The configuration of one filter rule.
///
/// The text form is a space separated list of `key=value` tokens:
///
/// ```text
/// prefix=10.0.0.0/8 action=drop priority=10 proto=tcp dport=22 flags=syn
/// ```
///
/// Only `prefix` and `action` are required.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuleCfg {
    /// The address prefix matched against the engine's configured
    /// [`MatchField`].
    pub prefix: Ipv4Cidr,
    /// Tie-break among rules sharing the same prefix. Higher wins.
    pub priority: u32,
    pub action: FilterAction,
    pub proto: ProtoFilter,
    pub src_ports: PortRange,
    pub dst_ports: PortRange,
    /// Flags a TCP packet must carry, at minimum, to match.
    pub tcp_flags: TcpFlags,
    /// Packets per second this rule may act on; 0 is unlimited.
    pub rate_limit: u32,
    /// Seconds after insertion at which the rule stops matching; 0 is
    /// never.
    pub expire_after: u32,
    pub label: Option<Label>,
}

impl RuleCfg {
    pub fn new(prefix: Ipv4Cidr, action: FilterAction) -> Self {
        Self {
            prefix,
            priority: 0,
            action,
            proto: ProtoFilter::Any,
            src_ports: PortRange::ANY,
            dst_ports: PortRange::ANY,
            tcp_flags: TcpFlags::empty(),
            rate_limit: 0,
            expire_after: 0,
            label: None,
        }
    }

    /// Check the invariants that the type system alone cannot hold
    /// for a deserialized configuration.
    pub fn validate(&self) -> Result<(), String> {
        let (ip, len) = self.prefix.parts();
        let masked = Ipv4Cidr::new_checked(ip, len.val())?;
        if masked != self.prefix {
            return Err(format!("host bits set in prefix, expected {masked}"));
        }

        if !self.src_ports.is_valid() {
            return Err(format!(
                "inverted source port range: {}-{}",
                self.src_ports.min, self.src_ports.max
            ));
        }

        if !self.dst_ports.is_valid() {
            return Err(format!(
                "inverted destination port range: {}-{}",
                self.dst_ports.min, self.dst_ports.max
            ));
        }

        if TcpFlags::from_bits(self.tcp_flags.bits()).is_none() {
            return Err(format!(
                "unknown TCP flag bits: {:#04x}",
                self.tcp_flags.bits()
            ));
        }

        if !self.tcp_flags.is_empty()
            && !matches!(
                self.proto,
                ProtoFilter::Any | ProtoFilter::Exact(Protocol::TCP)
            )
        {
            return Err(format!(
                "TCP flags given for non-TCP protocol {}",
                self.proto
            ));
        }

        Ok(())
    }
}

impl FromStr for RuleCfg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut prefix = None;
        let mut action = None;
        let mut priority = None;
        let mut proto = None;
        let mut sport = None;
        let mut dport = None;
        let mut flags = None;
        let mut rate = None;
        let mut expire = None;
        let mut label = None;

        for token in s.split_ascii_whitespace() {
            let Some((key, val)) = token.split_once('=') else {
                return Err(format!("bad token: {token}"));
            };

            match key.to_ascii_lowercase().as_str() {
                "prefix" => prefix = Some(val.parse::<Ipv4Cidr>()?),
                "action" => action = Some(val.parse::<FilterAction>()?),
                "priority" => {
                    priority = Some(val.parse::<u32>().map_err(|e| {
                        format!("bad priority: '{val}' {e}")
                    })?);
                }
                "proto" => proto = Some(val.parse::<ProtoFilter>()?),
                "sport" => sport = Some(val.parse::<PortRange>()?),
                "dport" => dport = Some(val.parse::<PortRange>()?),
                "flags" => flags = Some(val.parse::<TcpFlags>()?),
                "rate" => {
                    rate = Some(
                        val.parse::<u32>()
                            .map_err(|e| format!("bad rate: '{val}' {e}"))?,
                    );
                }
                "expire" => {
                    expire = Some(
                        val.parse::<u32>()
                            .map_err(|e| format!("bad expire: '{val}' {e}"))?,
                    );
                }
                "label" => label = Some(val.parse::<Label>()?),
                _ => return Err(format!("invalid key: {token}")),
            }
        }

        let Some(prefix) = prefix else {
            return Err("missing 'prefix' key".to_string());
        };

        let Some(action) = action else {
            return Err("missing 'action' key".to_string());
        };

        let cfg = RuleCfg {
            prefix,
            priority: priority.unwrap_or(0),
            action,
            proto: proto.unwrap_or_default(),
            src_ports: sport.unwrap_or_default(),
            dst_ports: dport.unwrap_or_default(),
            tcp_flags: flags.unwrap_or_default(),
            rate_limit: rate.unwrap_or(0),
            expire_after: expire.unwrap_or(0),
            label,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl Display for RuleCfg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "prefix={} action={} priority={}",
            self.prefix, self.action, self.priority
        )?;

        if self.proto != ProtoFilter::Any {
            write!(f, " proto={}", self.proto)?;
        }
        if !self.src_ports.is_any() {
            write!(f, " sport={}", self.src_ports)?;
        }
        if !self.dst_ports.is_any() {
            write!(f, " dport={}", self.dst_ports)?;
        }
        if !self.tcp_flags.is_empty() {
            write!(f, " flags={}", self.tcp_flags)?;
        }
        if self.rate_limit != 0 {
            write!(f, " rate={}", self.rate_limit)?;
        }
        if self.expire_after != 0 {
            write!(f, " expire={}", self.expire_after)?;
        }
        if let Some(label) = &self.label {
            write!(f, " label={label}")?;
        }

        Ok(())
    }
}

/// A rule as reported back by `list_rules`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RuleDump {
    pub id: RuleId,
    pub cfg: RuleCfg,
    /// Monotonic nanoseconds at which the rule was first inserted.
    pub created_at: u64,
    /// Whether the rule had already expired when the dump was taken.
    pub expired: bool,
    pub stats: RuleStats,
}
