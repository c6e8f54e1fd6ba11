// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! SwiftGuard: a packet classification engine.
//!
//! Each inbound frame is parsed into a flow key, matched against a
//! longest-prefix-match rule store, gated by the matched rule's rate
//! limiter and turned into a [`Verdict`](api::Verdict). The control
//! plane edits rules and redirect targets concurrently with
//! classification.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

extern crate alloc;

pub mod api {
    pub use swiftguard_api::*;
}

pub mod ddi;
pub mod engine;
#[cfg(any(feature = "std", test))]
pub mod print;
pub mod provider;

pub use engine::Engine;
pub use engine::EngineCfg;
