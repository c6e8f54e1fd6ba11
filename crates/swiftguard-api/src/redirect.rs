// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Redirect targets: the logical names rules use, and the physical
//! egress they resolve to.

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// Maximum length of a [`RedirectId`] or a [`Label`](crate::Label).
pub const NAME_MAX: usize = 32;

/// Maximum length of an interface name, as `IFNAMSIZ`.
pub const IFNAME_MAX: usize = 16;

/// The number of redirect targets a table can hold.
pub const MAX_REDIRECTS: usize = 64;

/// Build a bounded name, refusing anything that would not survive a
/// round trip through the rule syntax.
pub(crate) fn bounded_name<const N: usize>(
    kind: &str,
    val: &str,
) -> Result<heapless::String<N>, String> {
    if val.is_empty() {
        return Err(format!("empty {kind}"));
    }

    if let Some(c) = val.chars().find(|c| c.is_whitespace() || *c == '=') {
        return Err(format!("bad character {c:?} in {kind}: {val}"));
    }

    let mut name = heapless::String::new();
    name.push_str(val)
        .map_err(|_| format!("{kind} longer than {N} bytes: {val}"))?;
    Ok(name)
}

/// The logical identifier a redirect rule names.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "heapless::String<NAME_MAX>")]
pub struct RedirectId(heapless::String<NAME_MAX>);

impl TryFrom<heapless::String<NAME_MAX>> for RedirectId {
    type Error = String;

    fn try_from(val: heapless::String<NAME_MAX>) -> Result<Self, Self::Error> {
        Self::new(val.as_str())
    }
}

impl RedirectId {
    pub fn new(val: &str) -> Result<Self, String> {
        bounded_name("redirect id", val).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for RedirectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for RedirectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The physical egress a redirected packet leaves by.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Egress {
    pub ifindex: u32,
    pub ifname: heapless::String<IFNAME_MAX>,
}

impl Egress {
    pub fn new(ifindex: u32, ifname: &str) -> Result<Self, String> {
        Ok(Self { ifindex, ifname: bounded_name("interface name", ifname)? })
    }
}

impl Display for Egress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.ifname, self.ifindex)
    }
}

/// One entry of the redirect table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RedirectTarget {
    pub id: RedirectId,
    pub egress: Egress,
}
