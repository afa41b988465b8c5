use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pcap_parser::Linktype;

use super::layout;
use super::reader::FrameReader;
use crate::format::{Record, Timestamp};
use crate::pcap::PacketFrame;

/// How a frame's network layer was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Ipv4,
    Ipv6,
    Arp,
    /// EtherType not indexed, or a non-Ethernet link type; fields are zero.
    Unknown,
}

/// Flow-identifying fields of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFields {
    pub kind: FrameKind,
    pub ether_type: u16,
    pub l2_proto: u8,
    pub src_host: IpAddr,
    pub dst_host: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl PacketFields {
    fn unknown(ether_type: u16) -> Self {
        Self {
            kind: FrameKind::Unknown,
            ether_type,
            l2_proto: 0,
            src_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
        }
    }

    pub fn into_record(self, frame: &PacketFrame<'_>) -> Record {
        Record {
            timestamp: Timestamp {
                seconds: frame.seconds,
                micros: frame.micros,
            },
            start: frame.start,
            stop: frame.stop,
            ether_type: self.ether_type,
            l2_proto: self.l2_proto,
            src_host: self.src_host,
            dst_host: self.dst_host,
            src_port: self.src_port,
            dst_port: self.dst_port,
        }
    }
}

/// Extract the indexed fields from a captured frame.
///
/// Only Ethernet frames are decoded. Any field lying past the captured
/// length reads as zero.
pub fn parse_frame(frame: &[u8], linktype: Linktype) -> PacketFields {
    if linktype != Linktype::ETHERNET {
        return PacketFields::unknown(0);
    }
    let reader = FrameReader::new(frame);
    let ether_type = reader.read_u16_be(layout::ETHER_TYPE_RANGE.start).unwrap_or(0);
    match ether_type {
        layout::ETHERTYPE_IPV4 => parse_ipv4(&reader, ether_type),
        layout::ETHERTYPE_IPV6 => parse_ipv6(&reader, ether_type),
        layout::ETHERTYPE_ARP => parse_arp(&reader, ether_type),
        _ => PacketFields::unknown(ether_type),
    }
}

fn parse_ipv4(reader: &FrameReader<'_>, ether_type: u16) -> PacketFields {
    let ihl = reader
        .read_u8(layout::IPV4_VERSION_IHL_OFFSET)
        .map_or(0, |b| b & layout::IHL_MASK);
    let header_len = (usize::from(ihl) * 4).max(layout::IPV4_MIN_HEADER_LEN);
    let l2_proto = reader.read_u8(layout::IPV4_PROTOCOL_OFFSET).unwrap_or(0);
    let (src_port, dst_port) = ports(reader, l2_proto, layout::IPV4_HEADER_START + header_len);
    PacketFields {
        kind: FrameKind::Ipv4,
        ether_type,
        l2_proto,
        src_host: IpAddr::V4(
            reader
                .read_ipv4(layout::IPV4_SRC_RANGE)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
        ),
        dst_host: IpAddr::V4(
            reader
                .read_ipv4(layout::IPV4_DST_RANGE)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
        ),
        src_port,
        dst_port,
    }
}

fn parse_ipv6(reader: &FrameReader<'_>, ether_type: u16) -> PacketFields {
    let l2_proto = reader.read_u8(layout::IPV6_NEXT_HEADER_OFFSET).unwrap_or(0);
    let (src_port, dst_port) = ports(reader, l2_proto, layout::IPV6_PAYLOAD_OFFSET);
    PacketFields {
        kind: FrameKind::Ipv6,
        ether_type,
        l2_proto,
        src_host: IpAddr::V6(
            reader
                .read_ipv6(layout::IPV6_SRC_RANGE)
                .unwrap_or(Ipv6Addr::UNSPECIFIED),
        ),
        dst_host: IpAddr::V6(
            reader
                .read_ipv6(layout::IPV6_DST_RANGE)
                .unwrap_or(Ipv6Addr::UNSPECIFIED),
        ),
        src_port,
        dst_port,
    }
}

fn parse_arp(reader: &FrameReader<'_>, ether_type: u16) -> PacketFields {
    PacketFields {
        kind: FrameKind::Arp,
        ether_type,
        l2_proto: 0,
        src_host: IpAddr::V4(
            reader
                .read_ipv4(layout::ARP_SENDER_IP_RANGE)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
        ),
        dst_host: IpAddr::V4(
            reader
                .read_ipv4(layout::ARP_TARGET_IP_RANGE)
                .unwrap_or(Ipv4Addr::UNSPECIFIED),
        ),
        src_port: 0,
        dst_port: 0,
    }
}

fn ports(reader: &FrameReader<'_>, l2_proto: u8, l4_start: usize) -> (u16, u16) {
    if layout::PORTLESS_PROTOCOLS.contains(&l2_proto) {
        return (0, 0);
    }
    (
        reader
            .read_u16_be(l4_start + layout::SRC_PORT_OFFSET)
            .unwrap_or(0),
        reader
            .read_u16_be(l4_start + layout::DST_PORT_OFFSET)
            .unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use etherparse::PacketBuilder;
    use pcap_parser::Linktype;

    use super::{FrameKind, parse_frame};

    const SRC_MAC: [u8; 6] = [1, 2, 3, 4, 5, 6];
    const DST_MAC: [u8; 6] = [6, 5, 4, 3, 2, 1];

    #[test]
    fn ipv4_tcp_fields() {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(1000, 80, 1, 1024);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[0u8; 10]).unwrap();
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.kind, FrameKind::Ipv4);
        assert_eq!(fields.ether_type, 0x0800);
        assert_eq!(fields.l2_proto, 6);
        assert_eq!(fields.src_host, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(fields.dst_host, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!((fields.src_port, fields.dst_port), (1000, 80));
    }

    #[test]
    fn ipv4_options_shift_the_ports() {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(53, 5353);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();
        // Splice 4 bytes of options (IHL 6) in front of the UDP header.
        frame[14] = 0x46;
        frame.splice(34..34, [1u8, 1, 1, 0]);
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!((fields.src_port, fields.dst_port), (53, 5353));
        assert_eq!(fields.l2_proto, 17);
    }

    #[test]
    fn icmp_has_zero_ports() {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .icmpv4_echo_request(7, 9);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[0u8; 8]).unwrap();
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.l2_proto, 1);
        assert_eq!((fields.src_port, fields.dst_port), (0, 0));
    }

    #[test]
    fn ipv6_udp_and_icmpv6() {
        let src = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let dst = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv6(src, dst, 32)
            .udp(4000, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[1, 2, 3]).unwrap();
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.kind, FrameKind::Ipv6);
        assert_eq!(fields.src_host, IpAddr::V6(Ipv6Addr::from(src)));
        assert_eq!(fields.dst_host, IpAddr::V6(Ipv6Addr::from(dst)));
        assert_eq!((fields.src_port, fields.dst_port), (4000, 53));

        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv6(src, dst, 32)
            .icmpv6_echo_request(1, 2);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.l2_proto, 58);
        assert_eq!((fields.src_port, fields.dst_port), (0, 0));
    }

    #[test]
    fn arp_uses_sender_and_target_protocol_addresses() {
        let mut frame = vec![0u8; 42];
        frame[12..14].copy_from_slice(&[0x08, 0x06]);
        frame[28..32].copy_from_slice(&[192, 168, 0, 1]);
        frame[32..38].copy_from_slice(&[0xAA; 6]);
        frame[38..42].copy_from_slice(&[192, 168, 0, 254]);
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.kind, FrameKind::Arp);
        assert_eq!(fields.l2_proto, 0);
        assert_eq!(fields.src_host, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(fields.dst_host, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 254)));
    }

    #[test]
    fn short_and_unknown_frames_read_as_zero() {
        let mut frame = vec![0u8; 30];
        frame[12..14].copy_from_slice(&[0x08, 0x00]);
        frame[26..30].copy_from_slice(&[10, 0, 0, 1]);
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.src_host, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(fields.dst_host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!((fields.src_port, fields.dst_port), (0, 0));

        let mut frame = vec![0u8; 60];
        frame[12..14].copy_from_slice(&[0x88, 0xCC]);
        let fields = parse_frame(&frame, Linktype::ETHERNET);
        assert_eq!(fields.kind, FrameKind::Unknown);
        assert_eq!(fields.ether_type, 0x88CC);
        assert_eq!(fields.src_host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        assert_eq!(parse_frame(&[0u8; 4], Linktype::ETHERNET).ether_type, 0);
        assert_eq!(parse_frame(&frame, Linktype::RAW).kind, FrameKind::Unknown);
    }
}
