use std::ops::Range;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

pub const TS_SEC_RANGE: Range<usize> = 0..4;
pub const TS_FRAC_RANGE: Range<usize> = 4..8;
pub const CAPLEN_RANGE: Range<usize> = 8..12;

/// Little-endian microsecond pcap header, version 2.4, snaplen 262144,
/// link type 1 (Ethernet).
pub const OUTPUT_GLOBAL_HEADER: [u8; GLOBAL_HEADER_LEN] = [
    0xD4, 0xC3, 0xB2, 0xA1, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00,
];

pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
