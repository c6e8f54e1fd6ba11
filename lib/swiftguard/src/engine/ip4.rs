// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! IPv4 headers.

use crate::api::Ipv4Addr;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::network_endian::U16;

/// The size of an IPv4 header without options.
pub const IPV4_HDR_SZ: usize = core::mem::size_of::<Ipv4HdrRaw>();
pub const IPV4_VERSION: u8 = 4;

const FRAG_OFFSET_MASK: u16 = 0x1FFF;
const MORE_FRAGMENTS: u16 = 0x2000;

/// Note: For now we keep this unaligned to be safe.
#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: U16,
    pub ident: U16,
    pub frag_and_flags: U16,
    pub ttl: u8,
    pub proto: u8,
    pub csum: U16,
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    #[inline]
    pub fn version(&self) -> u8 {
        self.ver_hdr_len >> 4
    }

    /// The header length in bytes, options included.
    #[inline]
    pub fn hdr_len(&self) -> usize {
        usize::from(self.ver_hdr_len & 0x0F) * 4
    }

    /// The fragment offset, in 8-byte units.
    #[inline]
    pub fn frag_offset(&self) -> u16 {
        self.frag_and_flags.get() & FRAG_OFFSET_MASK
    }

    #[inline]
    pub fn more_frags(&self) -> bool {
        self.frag_and_flags.get() & MORE_FRAGMENTS != 0
    }

    /// Only the first fragment of a datagram carries the ULP header.
    #[inline]
    pub fn has_ulp_hdr(&self) -> bool {
        self.frag_offset() == 0
    }

    #[inline]
    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src)
    }

    #[inline]
    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst)
    }
}
