// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Routines for building Ethernet/IPv4 frames.
//!
//! The frames are emitted with smoltcp's wire types so that the bytes
//! the engine sees come from an independent encoder, checksums and
//! all.

use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::EthernetAddress;
use smoltcp::wire::EthernetFrame;
use smoltcp::wire::EthernetProtocol;
use smoltcp::wire::EthernetRepr;
use smoltcp::wire::Icmpv4Packet;
use smoltcp::wire::Icmpv4Repr;
use smoltcp::wire::IpAddress;
use smoltcp::wire::IpProtocol;
use smoltcp::wire::Ipv4Address;
use smoltcp::wire::Ipv4Packet;
use smoltcp::wire::Ipv4Repr;
use smoltcp::wire::TcpPacket;
use smoltcp::wire::UdpPacket;
use swiftguard::api::TcpFlags;

pub const ETHER_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;

pub const SRC_MAC: EthernetAddress =
    EthernetAddress([0xa8, 0x40, 0x25, 0x00, 0x00, 0x01]);
pub const DST_MAC: EthernetAddress =
    EthernetAddress([0xa8, 0x40, 0x25, 0x00, 0x00, 0x02]);

fn ip(s: &str) -> Ipv4Address {
    let addr: core::net::Ipv4Addr =
        s.parse().unwrap_or_else(|_| panic!("bad IPv4 address: {s}"));
    Ipv4Address::from_bytes(&addr.octets())
}

/// Wrap `payload` in an Ethernet header of the given ethertype.
pub fn ether_frame(ethertype: EthernetProtocol, payload: &[u8]) -> Vec<u8> {
    let repr =
        EthernetRepr { src_addr: SRC_MAC, dst_addr: DST_MAC, ethertype };
    let mut buf = vec![0u8; ETHER_HDR_LEN + payload.len()];
    let mut frame = EthernetFrame::new_unchecked(&mut buf[..]);
    repr.emit(&mut frame);
    frame.payload_mut().copy_from_slice(payload);
    buf
}

/// An Ethernet frame carrying an IPv4 packet whose upper layer bytes
/// are `ulp`.
pub fn ipv4_frame(
    src: &str,
    dst: &str,
    proto: IpProtocol,
    ulp: &[u8],
) -> Vec<u8> {
    let repr = Ipv4Repr {
        src_addr: ip(src),
        dst_addr: ip(dst),
        next_header: proto,
        payload_len: ulp.len(),
        hop_limit: 64,
    };
    let mut buf = vec![0u8; IPV4_HDR_LEN + ulp.len()];
    let mut pkt = Ipv4Packet::new_unchecked(&mut buf[..]);
    repr.emit(&mut pkt, &ChecksumCapabilities::default());
    pkt.payload_mut().copy_from_slice(ulp);
    ether_frame(EthernetProtocol::Ipv4, &buf)
}

/// A TCP segment with the given control bits and no payload.
pub fn tcp_frame(
    src: &str,
    sport: u16,
    dst: &str,
    dport: u16,
    flags: TcpFlags,
) -> Vec<u8> {
    tcp_frame_with_payload(src, sport, dst, dport, flags, &[])
}

pub fn tcp_frame_with_payload(
    src: &str,
    sport: u16,
    dst: &str,
    dport: u16,
    flags: TcpFlags,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = vec![0u8; TCP_HDR_LEN + payload.len()];
    let mut tcp = TcpPacket::new_unchecked(&mut buf[..]);
    tcp.set_src_port(sport);
    tcp.set_dst_port(dport);
    tcp.set_seq_number(smoltcp::wire::TcpSeqNumber(1));
    tcp.set_ack_number(smoltcp::wire::TcpSeqNumber(0));
    tcp.set_header_len(TCP_HDR_LEN as u8);
    tcp.clear_flags();
    tcp.set_fin(flags.contains(TcpFlags::FIN));
    tcp.set_syn(flags.contains(TcpFlags::SYN));
    tcp.set_rst(flags.contains(TcpFlags::RST));
    tcp.set_psh(flags.contains(TcpFlags::PSH));
    tcp.set_ack(flags.contains(TcpFlags::ACK));
    tcp.set_urg(flags.contains(TcpFlags::URG));
    tcp.set_window_len(64240);
    tcp.payload_mut().copy_from_slice(payload);
    tcp.fill_checksum(&IpAddress::Ipv4(ip(src)), &IpAddress::Ipv4(ip(dst)));
    ipv4_frame(src, dst, IpProtocol::Tcp, &buf)
}

/// A UDP datagram with no payload.
pub fn udp_frame(src: &str, sport: u16, dst: &str, dport: u16) -> Vec<u8> {
    udp_frame_with_payload(src, sport, dst, dport, &[])
}

pub fn udp_frame_with_payload(
    src: &str,
    sport: u16,
    dst: &str,
    dport: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = vec![0u8; UDP_HDR_LEN + payload.len()];
    let mut udp = UdpPacket::new_unchecked(&mut buf[..]);
    udp.set_src_port(sport);
    udp.set_dst_port(dport);
    udp.set_len((UDP_HDR_LEN + payload.len()) as u16);
    udp.payload_mut().copy_from_slice(payload);
    udp.fill_checksum(&IpAddress::Ipv4(ip(src)), &IpAddress::Ipv4(ip(dst)));
    ipv4_frame(src, dst, IpProtocol::Udp, &buf)
}

/// An ICMP echo request.
pub fn icmp_frame(src: &str, dst: &str) -> Vec<u8> {
    let data = b"swiftguard";
    let repr = Icmpv4Repr::EchoRequest { ident: 7, seq_no: 1, data };
    let mut buf = vec![0u8; repr.buffer_len()];
    let mut pkt = Icmpv4Packet::new_unchecked(&mut buf[..]);
    repr.emit(&mut pkt, &ChecksumCapabilities::default());
    ipv4_frame(src, dst, IpProtocol::Icmp, &buf)
}

/// Turn the IPv4 packet in `frame` into a non-first fragment at
/// `offset` bytes (a multiple of 8). Its upper layer header is then
/// no longer present as far as any parser is concerned.
pub fn make_fragment(frame: &mut [u8], offset: u16) {
    let mut pkt = Ipv4Packet::new_unchecked(&mut frame[ETHER_HDR_LEN..]);
    pkt.set_more_frags(true);
    pkt.set_frag_offset(offset);
    pkt.fill_checksum();
}
