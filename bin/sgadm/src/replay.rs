// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Replay captured traffic through an engine.

use anyhow::Context;
use anyhow::anyhow;
use anyhow::bail;
use pcap_parser::Linktype;
use pcap_parser::pcap;
use pcap_parser::pcap::LegacyPcapBlock;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use swiftguard::Engine;
use swiftguard::api::StatsSnapshot;
use swiftguard::api::Verdict;
use swiftguard::ddi::time::Moment;

/// One captured frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Capture time, relative to the first frame of the capture. A
    /// frame stamped earlier than the first is taken as arriving with
    /// it.
    pub ts: Duration,
    pub data: Vec<u8>,
}

/// Read every frame of a legacy (non-ng) Ethernet pcap file.
pub fn read_pcap<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Frame>> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_pcap(&data)
        .with_context(|| format!("bad capture {}", path.display()))
}

pub fn parse_pcap(data: &[u8]) -> anyhow::Result<Vec<Frame>> {
    let (mut rest, hdr) = pcap::parse_pcap_header(data)
        .map_err(|e| anyhow!("bad pcap header: {e:?}"))?;

    if hdr.network != Linktype::ETHERNET {
        bail!("unsupported link type {:?}", hdr.network);
    }

    let be = hdr.is_bigendian();
    let frac_to_nanos = if hdr.is_nanosecond_precision() { 1 } else { 1000 };

    let mut frames = vec![];
    let mut first = None;
    while !rest.is_empty() {
        let res = if be {
            pcap::parse_pcap_frame_be(rest)
        } else {
            pcap::parse_pcap_frame(rest)
        };
        let (next, block): (&[u8], LegacyPcapBlock<'_>) = res.map_err(|e| {
            anyhow!("bad frame #{}: {e:?}", frames.len())
        })?;

        // Capture timestamps are wall-clock time. Rebase them so the
        // first frame arrives at the replay epoch.
        let abs = Duration::new(
            u64::from(block.ts_sec),
            block.ts_usec.saturating_mul(frac_to_nanos),
        );
        let first = *first.get_or_insert(abs);
        frames.push(Frame {
            ts: abs.saturating_sub(first),
            data: block.data.to_vec(),
        });
        rest = next;
    }

    Ok(frames)
}

/// The outcome of one replayed frame.
#[derive(Clone, Debug, Serialize)]
pub struct ReplayRecord {
    pub index: usize,
    pub ts_ns: u64,
    pub len: usize,
    pub verdict: Verdict,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub records: Vec<ReplayRecord>,
    pub stats: StatsSnapshot,
}

/// Evaluate `frames` in order, each arriving at `epoch` plus its
/// capture timestamp, so rate limits and expiry see the capture's
/// own timing.
pub fn replay(
    eng: &Engine,
    frames: &[Frame],
    epoch: Moment,
) -> Vec<ReplayRecord> {
    frames
        .iter()
        .enumerate()
        .map(|(index, frame)| ReplayRecord {
            index,
            ts_ns: frame.ts.as_nanos() as u64,
            len: frame.data.len(),
            verdict: eng.evaluate(&frame.data, epoch + frame.ts),
        })
        .collect()
}
