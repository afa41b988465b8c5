use std::ops::Range;

use etherparse::{EtherType, IpNumber};

pub const ETHER_TYPE_RANGE: Range<usize> = 12..14;

pub const IPV4_VERSION_IHL_OFFSET: usize = 14;
pub const IPV4_PROTOCOL_OFFSET: usize = 23;
pub const IPV4_SRC_RANGE: Range<usize> = 26..30;
pub const IPV4_DST_RANGE: Range<usize> = 30..34;
pub const IPV4_HEADER_START: usize = 14;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IHL_MASK: u8 = 0x0F;

pub const IPV6_NEXT_HEADER_OFFSET: usize = 20;
pub const IPV6_SRC_RANGE: Range<usize> = 22..38;
pub const IPV6_DST_RANGE: Range<usize> = 38..54;
pub const IPV6_PAYLOAD_OFFSET: usize = 54;

pub const ARP_SENDER_IP_RANGE: Range<usize> = 28..32;
pub const ARP_TARGET_IP_RANGE: Range<usize> = 38..42;

pub const SRC_PORT_OFFSET: usize = 0;
pub const DST_PORT_OFFSET: usize = 2;

pub const ETHERTYPE_IPV4: u16 = EtherType::IPV4.0;
pub const ETHERTYPE_ARP: u16 = EtherType::ARP.0;
pub const ETHERTYPE_IPV6: u16 = EtherType::IPV6.0;

/// Protocols whose rows carry zero ports.
pub const PORTLESS_PROTOCOLS: [u8; 2] = [IpNumber::ICMP.0, IpNumber::IPV6_ICMP.0];
