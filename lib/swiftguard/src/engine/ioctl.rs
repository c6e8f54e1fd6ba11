// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The byte-level command entry point.
//!
//! A control plane that does not share an address space with the
//! engine hands it an encoded [`CmdEnvelope`] and gets back an encoded
//! `Result<T, SgError>`. See [`crate::api::cmd`] for the encoding.

use super::Engine;
use crate::api::API_VERSION;
use crate::api::CmdEnvelope;
use crate::api::CmdOk;
use crate::api::InsertRuleReq;
use crate::api::ListRedirectsReq;
use crate::api::ListRedirectsResp;
use crate::api::ListRulesReq;
use crate::api::ListRulesResp;
use crate::api::NoResp;
use crate::api::RemoveLabelReq;
use crate::api::RemovePrefixReq;
use crate::api::RemoveRedirectReq;
use crate::api::RemoveRuleReq;
use crate::api::RemovedRulesResp;
use crate::api::RuleIdResp;
use crate::api::SetRedirectReq;
use crate::api::SgCmd;
use crate::api::SgError;
use crate::api::SnapshotStatsReq;
use crate::api::StatsSnapshot;
use crate::api::UpdatePrefixReq;
use crate::api::UpdateRuleReq;
use crate::ddi::time::Moment;
use alloc::string::ToString;
use alloc::vec::Vec;
use serde::de::DeserializeOwned;

impl Engine {
    /// Run one encoded command and return the encoded response.
    ///
    /// Every failure, including a malformed envelope, comes back as an
    /// encoded `Err`; nothing here panics on caller input.
    pub fn handle_cmd(&self, bytes: &[u8]) -> Vec<u8> {
        let env = match CmdEnvelope::from_bytes(bytes) {
            Ok(env) => env,
            Err(e) => return hdlr_resp::<NoResp>(Err(e)),
        };

        if !env.check_version() {
            return hdlr_resp::<NoResp>(Err(SgError::BadApiVersion {
                user: env.api_version,
                kernel: API_VERSION,
            }));
        }

        match env.cmd {
            SgCmd::InsertRule => hdlr_resp(insert_rule_hdlr(self, &env)),
            SgCmd::UpdateRule => hdlr_resp(update_rule_hdlr(self, &env)),
            SgCmd::RemoveRule => hdlr_resp(remove_rule_hdlr(self, &env)),
            SgCmd::RemovePrefix => hdlr_resp(remove_prefix_hdlr(self, &env)),
            SgCmd::UpdatePrefix => hdlr_resp(update_prefix_hdlr(self, &env)),
            SgCmd::RemoveLabel => hdlr_resp(remove_label_hdlr(self, &env)),
            SgCmd::ListRules => hdlr_resp(list_rules_hdlr(self, &env)),
            SgCmd::SetRedirect => hdlr_resp(set_redirect_hdlr(self, &env)),
            SgCmd::UpdateRedirect => {
                hdlr_resp(update_redirect_hdlr(self, &env))
            }
            SgCmd::RemoveRedirect => {
                hdlr_resp(remove_redirect_hdlr(self, &env))
            }
            SgCmd::ListRedirects => {
                hdlr_resp(list_redirects_hdlr(self, &env))
            }
            SgCmd::SnapshotStats => {
                hdlr_resp(snapshot_stats_hdlr(self, &env))
            }
        }
    }
}

fn copy_in_req<T: DeserializeOwned>(env: &CmdEnvelope) -> Result<T, SgError> {
    postcard::from_bytes(&env.req)
        .map_err(|e| SgError::DeserCmdReq(e.to_string()))
}

// A rule request whose bytes are well formed but carry a value the
// rule types refuse, such as a prefix length past 32, is an invalid
// rule rather than a malformed request.
fn copy_in_rule_req<T: DeserializeOwned>(
    env: &CmdEnvelope,
) -> Result<T, SgError> {
    postcard::from_bytes(&env.req).map_err(|e| match e {
        postcard::Error::SerdeDeCustom => {
            SgError::InvalidRule(format!("rejected field value: {e}"))
        }
        _ => SgError::DeserCmdReq(e.to_string()),
    })
}

// Serialize the handler's result. If the response itself cannot be
// serialized, send that failure back in its place.
fn hdlr_resp<T: CmdOk>(resp: Result<T, SgError>) -> Vec<u8> {
    match postcard::to_allocvec(&resp) {
        Ok(bytes) => bytes,
        Err(e) => {
            let err: Result<NoResp, SgError> =
                Err(SgError::SerCmdResp(e.to_string()));
            postcard::to_allocvec(&err).unwrap_or_default()
        }
    }
}

fn insert_rule_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<RuleIdResp, SgError> {
    let req: InsertRuleReq = copy_in_rule_req(env)?;
    let id = eng.insert_rule(req.cfg, Moment::now())?;
    Ok(RuleIdResp { id })
}

fn update_rule_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<NoResp, SgError> {
    let req: UpdateRuleReq = copy_in_rule_req(env)?;
    eng.update_rule(req.id, req.cfg, Moment::now())?;
    Ok(NoResp::default())
}

fn remove_rule_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<NoResp, SgError> {
    let req: RemoveRuleReq = copy_in_req(env)?;
    eng.remove_rule(req.id)?;
    Ok(NoResp::default())
}

fn remove_prefix_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<RemovedRulesResp, SgError> {
    let req: RemovePrefixReq = copy_in_req(env)?;
    let ids = eng.remove_prefix(req.prefix)?;
    Ok(RemovedRulesResp { ids })
}

fn update_prefix_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<RuleIdResp, SgError> {
    let req: UpdatePrefixReq = copy_in_rule_req(env)?;
    let id = eng.update_prefix(req.prefix, req.cfg, Moment::now())?;
    Ok(RuleIdResp { id })
}

fn remove_label_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<RemovedRulesResp, SgError> {
    let req: RemoveLabelReq = copy_in_req(env)?;
    let ids = eng.remove_rule_by_label(&req.label)?;
    Ok(RemovedRulesResp { ids })
}

fn list_rules_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<ListRulesResp, SgError> {
    let _req: ListRulesReq = copy_in_req(env)?;
    Ok(ListRulesResp {
        match_field: eng.cfg().match_field,
        limit: eng.rules().limit() as u64,
        rules: eng.list_rules(Moment::now()),
    })
}

fn set_redirect_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<NoResp, SgError> {
    let req: SetRedirectReq = copy_in_req(env)?;
    eng.set_redirect(req.target)?;
    Ok(NoResp::default())
}

fn update_redirect_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<NoResp, SgError> {
    let req: SetRedirectReq = copy_in_req(env)?;
    eng.update_redirect(req.target)?;
    Ok(NoResp::default())
}

fn remove_redirect_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<NoResp, SgError> {
    let req: RemoveRedirectReq = copy_in_req(env)?;
    eng.remove_redirect(&req.id)?;
    Ok(NoResp::default())
}

fn list_redirects_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<ListRedirectsResp, SgError> {
    let _req: ListRedirectsReq = copy_in_req(env)?;
    Ok(ListRedirectsResp {
        limit: eng.redirects().limit() as u64,
        targets: eng.list_redirects(),
    })
}

fn snapshot_stats_hdlr(
    eng: &Engine,
    env: &CmdEnvelope,
) -> Result<StatsSnapshot, SgError> {
    let _req: SnapshotStatsReq = copy_in_req(env)?;
    Ok(eng.snapshot_stats(Moment::now()))
}
