// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types shared between the SwiftGuard engine and its control plane.
//!
//! Everything in here crosses the command boundary at some point, so
//! it is all `serde`-capable and usable without `std`.

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod cmd;
pub mod ip;
pub mod redirect;
pub mod rule;
pub mod stat;

pub use cmd::*;
pub use ip::*;
pub use redirect::*;
pub use rule::*;
pub use stat::*;

/// The overall version of the API. Anytime an API is added, removed,
/// or modified, this number should increment. It carries no semantic
/// meaning other than as a means to verify that the control plane and
/// the engine were compiled against the same API.
pub const API_VERSION: u64 = 3;

/// The sole output of evaluating one packet.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Verdict {
    /// Let the packet continue along its normal receive path.
    Pass,
    /// Discard the packet.
    Drop,
    /// Steer the packet out of the given egress.
    Redirect(Egress),
}

impl Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Drop => write!(f, "DROP"),
            Self::Redirect(egress) => write!(f, "REDIRECT({egress})"),
        }
    }
}
