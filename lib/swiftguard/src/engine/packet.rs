// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Header extraction: raw frame bytes in, [`FlowKey`] out.
//!
//! Every layer is bounds-checked against what is left of the buffer
//! before any of its fields are read. Parsing never allocates and
//! never panics on any input.

use super::ether::ETHER_TYPE_IPV4;
use super::ether::EtherHdrRaw;
use super::ip4::IPV4_HDR_SZ;
use super::ip4::IPV4_VERSION;
use super::ip4::Ipv4HdrRaw;
use super::tcp::TCP_HDR_SZ;
use super::tcp::TcpHdrRaw;
use super::udp::UdpHdrRaw;
use crate::api::Ipv4Addr;
use crate::api::MatchField;
use crate::api::PROTO_TCP;
use crate::api::PROTO_UDP;
use crate::api::TcpFlags;
use core::fmt;
use core::fmt::Display;
use zerocopy::FromBytes;

/// The classification-relevant fields of one packet.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    /// Zero unless the packet is TCP or UDP with its header present.
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: u8,
    /// Empty unless the packet is TCP.
    pub tcp_flags: TcpFlags,
    /// The length of the whole frame, in bytes.
    pub len: u64,
}

impl FlowKey {
    /// The address the rule store matches prefixes against.
    #[inline]
    pub fn addr(&self, field: MatchField) -> Ipv4Addr {
        match field {
            MatchField::Src => self.src_ip,
            MatchField::Dst => self.dst_ip,
        }
    }

    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.proto == PROTO_TCP
    }
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto={} flags={} len={}",
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.proto,
            self.tcp_flags,
            self.len,
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    TruncatedEthernet,
    NotIpv4 { ether_type: u16 },
    TruncatedIpv4,
    BadIpv4Version { vsn: u8 },
    BadIpv4HdrLen { hdr_len: usize },
    TruncatedTcp,
    BadTcpHdrLen { hdr_len: usize },
    TruncatedUdp,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TruncatedEthernet => write!(f, "truncated Ethernet header"),
            Self::NotIpv4 { ether_type } => {
                write!(f, "not IPv4 (ethertype {ether_type:#06x})")
            }
            Self::TruncatedIpv4 => write!(f, "truncated IPv4 header"),
            Self::BadIpv4Version { vsn } => {
                write!(f, "bad IPv4 version {vsn}")
            }
            Self::BadIpv4HdrLen { hdr_len } => {
                write!(f, "bad IPv4 header length {hdr_len}")
            }
            Self::TruncatedTcp => write!(f, "truncated TCP header"),
            Self::BadTcpHdrLen { hdr_len } => {
                write!(f, "bad TCP header length {hdr_len}")
            }
            Self::TruncatedUdp => write!(f, "truncated UDP header"),
        }
    }
}

impl core::error::Error for ParseError {}

/// Extract the [`FlowKey`] from an Ethernet frame.
pub fn parse(bytes: &[u8]) -> Result<FlowKey, ParseError> {
    let len = bytes.len() as u64;

    let (ether, rest) = EtherHdrRaw::ref_from_prefix(bytes)
        .map_err(|_| ParseError::TruncatedEthernet)?;
    let ether_type = ether.ether_type();
    if ether_type != ETHER_TYPE_IPV4 {
        return Err(ParseError::NotIpv4 { ether_type });
    }

    let (ip, _) = Ipv4HdrRaw::ref_from_prefix(rest)
        .map_err(|_| ParseError::TruncatedIpv4)?;
    if ip.version() != IPV4_VERSION {
        return Err(ParseError::BadIpv4Version { vsn: ip.version() });
    }

    let ip_hdr_len = ip.hdr_len();
    if ip_hdr_len < IPV4_HDR_SZ {
        return Err(ParseError::BadIpv4HdrLen { hdr_len: ip_hdr_len });
    }

    // Options make the header longer than the fixed part we cast.
    let Some(ulp) = rest.get(ip_hdr_len..) else {
        return Err(ParseError::TruncatedIpv4);
    };

    let mut key = FlowKey {
        src_ip: ip.src(),
        dst_ip: ip.dst(),
        src_port: 0,
        dst_port: 0,
        proto: ip.proto,
        tcp_flags: TcpFlags::empty(),
        len,
    };

    if !ip.has_ulp_hdr() {
        return Ok(key);
    }

    match ip.proto {
        PROTO_TCP => {
            let (tcp, _) = TcpHdrRaw::ref_from_prefix(ulp)
                .map_err(|_| ParseError::TruncatedTcp)?;
            let tcp_hdr_len = tcp.hdr_len();
            if tcp_hdr_len < TCP_HDR_SZ {
                return Err(ParseError::BadTcpHdrLen { hdr_len: tcp_hdr_len });
            }
            if tcp_hdr_len > ulp.len() {
                return Err(ParseError::TruncatedTcp);
            }

            key.src_port = tcp.src_port.get();
            key.dst_port = tcp.dst_port.get();
            key.tcp_flags = tcp.flags();
        }

        PROTO_UDP => {
            let (udp, _) = UdpHdrRaw::ref_from_prefix(ulp)
                .map_err(|_| ParseError::TruncatedUdp)?;
            key.src_port = udp.src_port.get();
            key.dst_port = udp.dst_port.get();
        }

        _ => {}
    }

    Ok(key)
}
