// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The control-plane command interface.
//!
//! A command travels as a postcard-encoded [`CmdEnvelope`] carrying the
//! caller's API version, the [`SgCmd`] and the command's own encoded
//! request. The engine answers with a postcard-encoded
//! `Result<T, SgError>`, where `T` is the command's [`CmdOk`] type.

use super::API_VERSION;
use super::ip::Ipv4Cidr;
use super::redirect::RedirectId;
use super::redirect::RedirectTarget;
use super::rule::Label;
use super::rule::MatchField;
use super::rule::RuleCfg;
use super::rule::RuleDump;
use super::rule::RuleId;
use super::stat::StatsSnapshot;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt::Debug;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(C)]
pub enum SgCmd {
    InsertRule = 10,        // add a filter rule
    UpdateRule = 11,        // replace a rule by id
    RemoveRule = 12,        // remove a rule by id
    RemovePrefix = 13,      // remove every rule at a prefix
    UpdatePrefix = 14,      // replace the top rule at a prefix
    RemoveLabel = 15,       // remove every rule with a label
    ListRules = 16,         // dump all rules
    SetRedirect = 20,       // add or replace a redirect target
    RemoveRedirect = 21,    // remove a redirect target
    ListRedirects = 22,     // dump the redirect table
    UpdateRedirect = 23,    // replace an existing redirect target
    SnapshotStats = 30,     // read all counters
}

impl TryFrom<u32> for SgCmd {
    type Error = ();

    fn try_from(num: u32) -> Result<Self, Self::Error> {
        match num {
            10 => Ok(Self::InsertRule),
            11 => Ok(Self::UpdateRule),
            12 => Ok(Self::RemoveRule),
            13 => Ok(Self::RemovePrefix),
            14 => Ok(Self::UpdatePrefix),
            15 => Ok(Self::RemoveLabel),
            16 => Ok(Self::ListRules),
            20 => Ok(Self::SetRedirect),
            21 => Ok(Self::RemoveRedirect),
            22 => Ok(Self::ListRedirects),
            23 => Ok(Self::UpdateRedirect),
            30 => Ok(Self::SnapshotStats),
            _ => Err(()),
        }
    }
}

/// Which fixed-capacity table refused an insert.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Table {
    Rules,
    Redirects,
}

impl core::fmt::Display for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Rules => write!(f, "rule store"),
            Self::Redirects => write!(f, "redirect table"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, thiserror::Error)]
pub enum SgError {
    #[error("API version mismatch: user {user}, engine {kernel}")]
    BadApiVersion { user: u64, kernel: u64 },

    #[error("{table} is full ({limit} entries)")]
    CapacityExceeded { table: Table, limit: u64 },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("no rule with id {0}")]
    RuleNotFound(RuleId),

    #[error("no rule at prefix {0}")]
    PrefixNotFound(Ipv4Cidr),

    #[error("no rule labeled {0}")]
    LabelNotFound(Label),

    #[error("no redirect target {0}")]
    RedirectNotFound(RedirectId),

    #[error("failed to deserialize command envelope: {0}")]
    DeserEnvelope(String),

    #[error("failed to deserialize command request: {0}")]
    DeserCmdReq(String),

    #[error("failed to serialize command request: {0}")]
    SerCmdReq(String),

    #[error("failed to serialize command response: {0}")]
    SerCmdResp(String),

    #[error("failed to deserialize command response: {0}")]
    DeserCmdResp(String),
}

/// A marker trait indicating a success response type that is returned
/// from a command and may be passed across the command boundary.
pub trait CmdOk: Debug + Serialize {}

impl CmdOk for () {}

/// Indicates no meaningful response value on success.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NoResp {
    pub unused: u64,
}

impl CmdOk for NoResp {}

/// The wrapper every command is sent in.
#[derive(Debug, Deserialize, Serialize)]
pub struct CmdEnvelope {
    pub api_version: u64,
    pub cmd: SgCmd,
    pub req: Vec<u8>,
}

impl CmdEnvelope {
    /// Encode `req` for `cmd` at this build's API version.
    pub fn new<R: Serialize>(cmd: SgCmd, req: &R) -> Result<Self, SgError> {
        let req = postcard::to_allocvec(req)
            .map_err(|e| SgError::SerCmdReq(e.to_string()))?;
        Ok(Self { api_version: API_VERSION, cmd, req })
    }

    /// Is this the expected API version?
    ///
    /// NOTE: This function is compiled into both the control plane and
    /// the engine. As long as we remember to update the `API_VERSION`
    /// value when making API changes, this method will return `false`
    /// when they disagree.
    pub fn check_version(&self) -> bool {
        self.api_version == API_VERSION
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SgError> {
        postcard::to_allocvec(self)
            .map_err(|e| SgError::SerCmdReq(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SgError> {
        postcard::from_bytes(bytes)
            .map_err(|e| SgError::DeserEnvelope(e.to_string()))
    }
}

/// Decode the engine's answer to a command.
pub fn resp_from_bytes<T>(bytes: &[u8]) -> Result<T, SgError>
where
    T: CmdOk + DeserializeOwned,
{
    postcard::from_bytes::<Result<T, SgError>>(bytes)
        .map_err(|e| SgError::DeserCmdResp(e.to_string()))?
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InsertRuleReq {
    pub cfg: RuleCfg,
}

/// The id a rule was stored under.
#[derive(Debug, Deserialize, Serialize)]
pub struct RuleIdResp {
    pub id: RuleId,
}

impl CmdOk for RuleIdResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateRuleReq {
    pub id: RuleId,
    pub cfg: RuleCfg,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemoveRuleReq {
    pub id: RuleId,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemovePrefixReq {
    pub prefix: Ipv4Cidr,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdatePrefixReq {
    pub prefix: Ipv4Cidr,
    pub cfg: RuleCfg,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemoveLabelReq {
    pub label: Label,
}

/// The ids of every rule a bulk removal took out.
#[derive(Debug, Deserialize, Serialize)]
pub struct RemovedRulesResp {
    pub ids: Vec<RuleId>,
}

impl CmdOk for RemovedRulesResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListRulesReq {
    pub unused: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListRulesResp {
    pub match_field: MatchField,
    pub limit: u64,
    pub rules: Vec<RuleDump>,
}

impl CmdOk for ListRulesResp {}

/// The request for both `SetRedirect` and `UpdateRedirect`.
#[derive(Debug, Deserialize, Serialize)]
pub struct SetRedirectReq {
    pub target: RedirectTarget,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemoveRedirectReq {
    pub id: RedirectId,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListRedirectsReq {
    pub unused: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListRedirectsResp {
    pub limit: u64,
    pub targets: Vec<RedirectTarget>,
}

impl CmdOk for ListRedirectsResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct SnapshotStatsReq {
    pub unused: u64,
}

impl CmdOk for StatsSnapshot {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_version() {
        let env =
            CmdEnvelope::new(SgCmd::ListRules, &ListRulesReq { unused: 0 })
                .unwrap();
        assert!(env.check_version());

        let bytes = env.to_bytes().unwrap();
        let mut back = CmdEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(back.cmd, SgCmd::ListRules);
        back.api_version += 1;
        assert!(!back.check_version());
    }

    #[test]
    fn garbage_envelope() {
        assert!(matches!(
            CmdEnvelope::from_bytes(&[0xff; 3]),
            Err(SgError::DeserEnvelope(_))
        ));
    }

    #[test]
    fn response_decoding() {
        let ok: Result<RuleIdResp, SgError> = Ok(RuleIdResp { id: 7 });
        let bytes = postcard::to_allocvec(&ok).unwrap();
        assert_eq!(resp_from_bytes::<RuleIdResp>(&bytes).unwrap().id, 7);

        let err: Result<RuleIdResp, SgError> = Err(SgError::RuleNotFound(9));
        let bytes = postcard::to_allocvec(&err).unwrap();
        assert_eq!(
            resp_from_bytes::<RuleIdResp>(&bytes).unwrap_err(),
            SgError::RuleNotFound(9)
        );

        assert!(matches!(
            resp_from_bytes::<RuleIdResp>(&[]),
            Err(SgError::DeserCmdResp(_))
        ));
    }

    #[test]
    fn cmd_numbers() {
        assert_eq!(SgCmd::try_from(16), Ok(SgCmd::ListRules));
        assert_eq!(SgCmd::try_from(99), Err(()));
    }

    #[test]
    fn error_messages() {
        let err = SgError::CapacityExceeded { table: Table::Rules, limit: 2 };
        assert_eq!(err.to_string(), "rule store is full (2 entries)");
    }
}
