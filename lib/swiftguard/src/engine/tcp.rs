// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! TCP headers.

use crate::api::TcpFlags;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::network_endian::U16;
use zerocopy::byteorder::network_endian::U32;

pub const TCP_HDR_SZ: usize = core::mem::size_of::<TcpHdrRaw>();

#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct TcpHdrRaw {
    pub src_port: U16,
    pub dst_port: U16,
    pub seq: U32,
    pub ack: U32,
    pub offset: u8,
    pub flags: u8,
    pub win: U16,
    pub csum: U16,
    pub urg: U16,
}

impl TcpHdrRaw {
    /// The header length in bytes, options included.
    #[inline]
    pub fn hdr_len(&self) -> usize {
        usize::from(self.offset >> 4) * 4
    }

    /// The control bits we classify on. ECE, CWR and the reserved bits
    /// are dropped.
    #[inline]
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bits_truncate(self.flags)
    }
}
