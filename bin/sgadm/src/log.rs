// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Logging for the admin tool, and the bridge that carries the
//! engine's control-plane messages onto it.

use slog::Drain;
use slog::Logger;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use swiftguard::provider::LogLevel;
use swiftguard::provider::LogProvider;

/// Build the root logger: terminal output on stderr, filtered by
/// `RUST_LOG` when set and by `default_filter` otherwise, drained off
/// the calling thread.
pub fn init(default_filter: &str) -> Logger {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| default_filter.to_string());

    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::LogBuilder::new(drain)
        .parse(&filter)
        .build()
        .ignore_res();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!("component" => "sgadm"))
}

/// A [`LogProvider`] writing to a [`slog::Logger`].
pub struct SlogLog {
    log: Logger,
}

impl SlogLog {
    pub fn new(log: &Logger) -> Self {
        Self { log: log.new(o!("component" => "engine")) }
    }
}

impl LogProvider for SlogLog {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => info!(self.log, "{msg}"),
            LogLevel::Warn => warn!(self.log, "{msg}"),
            LogLevel::Error => error!(self.log, "{msg}"),
        }
    }
}
