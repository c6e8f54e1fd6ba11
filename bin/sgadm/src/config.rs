// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The TOML configuration an engine is loaded from.
//!
//! ```toml
//! log_level = "info"
//!
//! [engine]
//! match_field = "src"
//! max_rules = 10240
//!
//! [[redirect]]
//! id = "eth-mirror"
//! ifindex = 4
//! ifname = "eth1"
//!
//! [[rule]]
//! spec = "prefix=10.0.0.0/8 action=drop proto=tcp dport=22 label=ssh"
//! ```

use crate::SgHdl;
use anyhow::Context;
use anyhow::anyhow;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use swiftguard::Engine;
use swiftguard::EngineCfg;
use swiftguard::api::Egress;
use swiftguard::api::RedirectTarget;
use swiftguard::api::RuleCfg;
use swiftguard::provider::Providers;

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub engine: EngineCfg,

    #[serde(default, rename = "redirect")]
    pub redirects: Vec<RedirectEntry>,

    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleEntry>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectEntry {
    pub id: String,
    pub ifindex: u32,
    pub ifname: String,
}

impl TryFrom<&RedirectEntry> for RedirectTarget {
    type Error = anyhow::Error;

    fn try_from(entry: &RedirectEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entry.id.parse().map_err(|e| anyhow!("{e}"))?,
            egress: Egress::new(entry.ifindex, &entry.ifname)
                .map_err(|e| anyhow!("{e}"))?,
        })
    }
}

/// One rule, in the single-line `key=value` syntax.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub spec: String,
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).context("invalid configuration")
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        text.parse()
            .with_context(|| format!("failed to load {}", path.display()))
    }

    /// Parse every rule line without touching an engine.
    pub fn rule_cfgs(&self) -> anyhow::Result<Vec<RuleCfg>> {
        self.rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| {
                rule.spec.parse::<RuleCfg>().map_err(|e| {
                    anyhow!("rule #{idx} ({}): {e}", rule.spec)
                })
            })
            .collect()
    }

    /// Build an engine holding this configuration's redirects and
    /// rules, in file order.
    pub fn build(&self, providers: Providers) -> anyhow::Result<SgHdl> {
        let hdl = SgHdl::new(Engine::new(self.engine, providers));

        for (idx, entry) in self.redirects.iter().enumerate() {
            let target = RedirectTarget::try_from(entry)
                .with_context(|| format!("redirect #{idx}"))?;
            hdl.set_redirect(target)
                .with_context(|| format!("redirect #{idx}"))?;
        }

        for (idx, cfg) in self.rule_cfgs()?.into_iter().enumerate() {
            hdl.insert_rule(cfg).with_context(|| format!("rule #{idx}"))?;
        }

        Ok(hdl)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use swiftguard::api::MatchField;

    const CFG: &str = r#"
log_level = "debug"

[engine]
match_field = "dst"
max_rules = 2

[[redirect]]
id = "mirror"
ifindex = 4
ifname = "eth1"

[[rule]]
spec = "prefix=10.0.0.0/8 action=redirect:mirror"

[[rule]]
spec = "prefix=10.1.0.0/16 action=drop proto=tcp dport=22 label=ssh"
"#;

    #[test]
    fn full_config() {
        let cfg: Config = CFG.parse().unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.engine.match_field, MatchField::Dst);
        assert_eq!(cfg.redirects.len(), 1);

        let hdl = cfg.build(Providers::default()).unwrap();
        let rules = hdl.list_rules().unwrap();
        assert_eq!(rules.limit, 2);
        assert_eq!(rules.rules.len(), 2);
        assert_eq!(hdl.list_redirects().unwrap().targets.len(), 1);
    }

    #[test]
    fn defaults() {
        let cfg: Config = "".parse().unwrap();
        assert_eq!(cfg.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(cfg.engine, EngineCfg::default());
        assert!(cfg.rules.is_empty());
    }

    #[test]
    fn errors_name_the_entry() {
        let err = "bogus = 1".parse::<Config>().unwrap_err();
        assert!(format!("{err:#}").contains("bogus"));

        let cfg: Config = r#"
[[rule]]
spec = "prefix=10.0.0.0/8 action=drop"
[[rule]]
spec = "prefix=10.0.0.0/8 action=explode"
"#
        .parse()
        .unwrap();
        let err = cfg.build(Providers::default()).unwrap_err();
        assert!(format!("{err:#}").contains("rule #1"));

        // Capacity is reported by the engine itself.
        let cfg: Config = r#"
[engine]
max_rules = 1
[[rule]]
spec = "prefix=10.0.0.0/8 action=drop"
[[rule]]
spec = "prefix=11.0.0.0/8 action=drop"
"#
        .parse()
        .unwrap();
        let err = cfg.build(Providers::default()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("rule #1"), "{msg}");
        assert!(msg.contains("full"), "{msg}");
    }
}
