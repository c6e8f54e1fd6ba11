// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Providers let the engine run in different contexts by plugging in
//! implementations of the services it needs from its host. Today that
//! is only logging: the packet path never logs, but control-plane
//! operations report what they did through a [`LogProvider`].

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;
use core::fmt::Display;

/// The set of all host-specific providers required by an engine.
pub struct Providers {
    pub log: Box<dyn LogProvider>,
}

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the engine is running.
///
/// For example, in a unit test this could map to `println!`. In the
/// admin tool it maps onto a `slog::Logger`.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Discards everything.
#[derive(Clone, Copy)]
pub struct NullLog;

impl LogProvider for NullLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

/// Keeps every message in memory, for tests that assert on what the
/// engine reported.
#[derive(Default)]
pub struct RecordLog {
    msgs: crate::ddi::sync::KMutex<alloc::vec::Vec<(LogLevel, String)>>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> alloc::vec::Vec<(LogLevel, String)> {
        core::mem::take(&mut *self.msgs.lock())
    }
}

impl<T: LogProvider + ?Sized> LogProvider for alloc::sync::Arc<T> {
    fn log(&self, level: LogLevel, msg: &str) {
        (**self).log(level, msg)
    }
}

impl LogProvider for RecordLog {
    fn log(&self, level: LogLevel, msg: &str) {
        self.msgs.lock().push((level, String::from(msg)));
    }
}

impl Default for Providers {
    fn default() -> Self {
        Self { log: Box::new(NullLog) }
    }
}
