// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Routines for building and reading packet capture files.

use pcap_parser::Linktype;
use pcap_parser::ToVec;
use pcap_parser::pcap;
use pcap_parser::pcap::LegacyPcapBlock;
use pcap_parser::pcap::PcapHeader;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

fn get_header(offset: &[u8]) -> (&[u8], PcapHeader) {
    match pcap::parse_pcap_header(offset) {
        Ok((new_offset, header)) => (new_offset, header),
        Err(e) => panic!("failed to get header: {e:?}"),
    }
}

fn next_block(offset: &[u8]) -> (&[u8], LegacyPcapBlock<'_>) {
    match pcap::parse_pcap_frame(offset) {
        Ok((new_offset, block)) => {
            // We always want access to the entire packet.
            assert_eq!(block.origlen, block.caplen);
            (new_offset, block)
        }

        Err(e) => panic!("failed to get next block: {e:?}"),
    }
}

/// Build a packet capture file from a series of frames.
pub struct PcapBuilder {
    file: File,
}

impl PcapBuilder {
    /// Create a new pcap builder, writing all captures to `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let mut file = File::create(path).unwrap();

        let mut hdr = PcapHeader {
            magic_number: 0xa1b2c3d4,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: 1500,
            network: Linktype::ETHERNET,
        };

        file.write_all(&hdr.to_vec().unwrap()).unwrap();

        Self { file }
    }

    /// Add a frame captured `ts` after the start of the capture.
    pub fn add_frame(&mut self, ts: Duration, bytes: &[u8]) {
        let mut block = LegacyPcapBlock {
            ts_sec: ts.as_secs() as u32,
            ts_usec: ts.subsec_micros(),
            caplen: bytes.len() as u32,
            origlen: bytes.len() as u32,
            data: bytes,
        };

        self.file.write_all(&block.to_vec().unwrap()).unwrap();
    }
}

/// Read back every frame of a capture written by [`PcapBuilder`].
pub fn read_frames<P: AsRef<Path>>(path: P) -> Vec<(Duration, Vec<u8>)> {
    let data = std::fs::read(path).unwrap();
    let (mut rest, hdr) = get_header(&data);
    assert_eq!(hdr.network, Linktype::ETHERNET);

    let mut frames = vec![];
    while !rest.is_empty() {
        let (next, block) = next_block(rest);
        let ts = Duration::new(block.ts_sec as u64, block.ts_usec * 1000);
        frames.push((ts, block.data.to_vec()));
        rest = next;
    }
    frames
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::udp_frame;

    #[test]
    fn write_then_read() {
        let path = std::env::temp_dir()
            .join(format!("sg-pcap-{}.pcap", std::process::id()));
        let f1 = udp_frame("10.0.0.1", 1, "10.0.0.2", 2);
        let f2 = udp_frame("10.0.0.3", 3, "10.0.0.4", 4);

        let mut pcap = PcapBuilder::new(&path);
        pcap.add_frame(Duration::from_millis(0), &f1);
        pcap.add_frame(Duration::from_millis(1500), &f2);
        drop(pcap);

        let frames = read_frames(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1, f1);
        assert_eq!(frames[1], (Duration::from_millis(1500), f2));
    }
}
