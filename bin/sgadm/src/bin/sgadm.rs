// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use slog::debug;
use slog::info;

use sgadm::SgHdl;
use sgadm::config::Config;
use sgadm::config::DEFAULT_LOG_LEVEL;
use sgadm::log::SlogLog;
use sgadm::replay::ReplayReport;
use swiftguard::api::API_VERSION;
use swiftguard::api::RuleCfg;
use swiftguard::ddi::time::Moment;
use swiftguard::print::print_redirects;
use swiftguard::print::print_rules;
use swiftguard::print::print_stats;
use swiftguard::print::print_throughput_into;
use swiftguard::provider::Providers;

/// Administer a SwiftGuard packet classification engine
#[derive(Debug, Parser)]
#[command(version = sg_pkg_version())]
enum Command {
    /// Load a configuration and report any errors in it.
    Check { config: PathBuf },

    /// Load a configuration and list its rules.
    ListRules {
        config: PathBuf,

        /// Include each rule's counters.
        #[arg(long)]
        stats: bool,
    },

    /// Load a configuration and list its redirect targets.
    ListRedirects { config: PathBuf },

    /// Evaluate every frame of a packet capture.
    Replay {
        config: PathBuf,
        pcap: PathBuf,

        /// Emit the verdicts and counters as JSON.
        #[arg(long)]
        json: bool,

        /// Print each frame's verdict.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a single rule line and print it back normalized.
    ParseRule { rule: String },
}

fn sg_pkg_version() -> String {
    format!("{}.{API_VERSION}", env!("CARGO_PKG_VERSION"))
}

fn load(path: &Path) -> anyhow::Result<(slog::Logger, Config, SgHdl)> {
    let cfg = Config::load(path)?;
    let log = sgadm::log::init(&cfg.log_level);
    let providers = Providers { log: Box::new(SlogLog::new(&log)) };
    let hdl = cfg.build(providers)?;
    debug!(log, "configuration loaded"; "path" => %path.display());
    Ok((log, cfg, hdl))
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    match cmd {
        Command::Check { config } => {
            let (log, cfg, _hdl) = load(&config)?;
            info!(
                log,
                "configuration ok";
                "rules" => cfg.rules.len(),
                "redirects" => cfg.redirects.len(),
            );
        }

        Command::ListRules { config, stats } => {
            let (_log, _cfg, hdl) = load(&config)?;
            print_rules(&hdl.list_rules()?, stats)?;
        }

        Command::ListRedirects { config } => {
            let (_log, _cfg, hdl) = load(&config)?;
            print_redirects(&hdl.list_redirects()?)?;
        }

        Command::Replay { config, pcap, json, verbose } => {
            let (log, _cfg, hdl) = load(&config)?;
            let frames = sgadm::replay::read_pcap(&pcap)?;
            info!(log, "replaying capture"; "frames" => frames.len());

            let epoch = Moment::now();
            let before = hdl.snapshot_stats()?;
            let records = sgadm::replay::replay(hdl.engine(), &frames, epoch);
            let stats = hdl.snapshot_stats()?;

            if json {
                let report = ReplayReport { records, stats };
                let out = serde_json::to_string_pretty(&report)
                    .context("failed to serialize report")?;
                println!("{out}");
                return Ok(());
            }

            if verbose {
                for r in &records {
                    println!(
                        "{:>6} {:>12}ns {:>5}B {}",
                        r.index, r.ts_ns, r.len, r.verdict
                    );
                }
                println!();
            }

            print_stats(&stats)?;
            println!();
            print_throughput_into(&mut std::io::stdout(), &before, &stats)?;
        }

        Command::ParseRule { rule } => {
            let cfg: RuleCfg = rule
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid rule: {e}"))?;
            println!("{cfg}");
        }
    }

    Ok(())
}
