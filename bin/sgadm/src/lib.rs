// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! SwiftGuard administration library.
//!
//! The admin tool owns an engine for the life of one invocation: it
//! loads a configuration into it, then drives it through the same
//! byte-level command interface an out-of-process control plane
//! would use.

pub mod config;
pub mod log;
pub mod replay;

use serde::Serialize;
use serde::de::DeserializeOwned;
use swiftguard::Engine;
use swiftguard::api::CmdEnvelope;
use swiftguard::api::CmdOk;
use swiftguard::api::InsertRuleReq;
use swiftguard::api::ListRedirectsReq;
use swiftguard::api::ListRedirectsResp;
use swiftguard::api::ListRulesReq;
use swiftguard::api::ListRulesResp;
use swiftguard::api::NoResp;
use swiftguard::api::RedirectTarget;
use swiftguard::api::RuleCfg;
use swiftguard::api::RuleIdResp;
use swiftguard::api::SetRedirectReq;
use swiftguard::api::SgCmd;
use swiftguard::api::SgError;
use swiftguard::api::SnapshotStatsReq;
use swiftguard::api::StatsSnapshot;
use swiftguard::api::resp_from_bytes;
use thiserror::Error;

/// Errors related to administering an engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request serialization failed for command {0:?}: {1}")]
    ReqSer(SgCmd, SgError),

    #[error("command {0:?} failed: {1}")]
    CommandError(SgCmd, SgError),
}

/// The handle used to send administration commands to an engine.
pub struct SgHdl {
    engine: Engine,
}

impl core::fmt::Debug for SgHdl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SgHdl").finish_non_exhaustive()
    }
}

impl SgHdl {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// The engine itself, for the packet path.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Add a filter rule, returning its id.
    pub fn insert_rule(&self, cfg: RuleCfg) -> Result<RuleIdResp, Error> {
        self.run_cmd(SgCmd::InsertRule, &InsertRuleReq { cfg })
    }

    pub fn list_rules(&self) -> Result<ListRulesResp, Error> {
        self.run_cmd(SgCmd::ListRules, &ListRulesReq { unused: 0 })
    }

    /// Add or replace a redirect target.
    pub fn set_redirect(
        &self,
        target: RedirectTarget,
    ) -> Result<NoResp, Error> {
        self.run_cmd(SgCmd::SetRedirect, &SetRedirectReq { target })
    }

    pub fn list_redirects(&self) -> Result<ListRedirectsResp, Error> {
        self.run_cmd(SgCmd::ListRedirects, &ListRedirectsReq { unused: 0 })
    }

    /// Read every counter.
    pub fn snapshot_stats(&self) -> Result<StatsSnapshot, Error> {
        self.run_cmd(SgCmd::SnapshotStats, &SnapshotStatsReq { unused: 0 })
    }

    fn run_cmd<T, R>(&self, cmd: SgCmd, req: &R) -> Result<T, Error>
    where
        T: CmdOk + DeserializeOwned,
        R: Serialize,
    {
        let env = CmdEnvelope::new(cmd, req)
            .and_then(|env| env.to_bytes())
            .map_err(|e| Error::ReqSer(cmd, e))?;
        let resp = self.engine.handle_cmd(&env);
        resp_from_bytes(&resp).map_err(|e| Error::CommandError(cmd, e))
    }
}
