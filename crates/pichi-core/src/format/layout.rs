use std::ops::Range;

use etherparse::EtherType;

pub const INDEX_MAGIC: [u8; 4] = [0xC8, 0xD3, 0xF7, 0x3D];
pub const FILE_SEPARATOR: [u8; 4] = [0x0C, 0x07, 0x00, 0x00];
pub const FOOTER_SEPARATOR: [u8; 4] = [0x61, 0x07, 0x00, 0x00];
pub const SEPARATOR_LEN: usize = 4;

pub const HEADER_FIXED_LEN: usize = 10;
pub const MAX_HEADER_LEN: usize = u8::MAX as usize;

pub const MAX_SOURCE_NAME_LEN: usize = u8::MAX as usize;
pub const MAX_FILES: usize = u8::MAX as usize;

pub const TIMESTAMP_LEN: usize = 8;
pub const ETHER_TYPE_LEN: usize = 2;
pub const L2_PROTO_LEN: usize = 1;
pub const PORT_LEN: usize = 2;
pub const IPV4_ADDR_LEN: usize = 4;
pub const IPV6_ADDR_LEN: usize = 16;

pub const ETHERTYPE_IPV6: u16 = EtherType::IPV6.0;

pub const TEXT_DELIMITER: char = '|';
pub const TEXT_FIELD_COUNT: usize = 10;

/// Binary index versions understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexVersion {
    /// 32-bit file offsets.
    V2,
    /// 64-bit file offsets.
    #[default]
    V3,
}

impl IndexVersion {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            2 => Some(IndexVersion::V2),
            3 => Some(IndexVersion::V3),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            IndexVersion::V2 => 2,
            IndexVersion::V3 => 3,
        }
    }

    pub fn offset_len(self) -> usize {
        match self {
            IndexVersion::V2 => 4,
            IndexVersion::V3 => 8,
        }
    }

    /// Position of the EtherType inside a row; the row size depends on it.
    pub fn ether_type_offset(self) -> usize {
        TIMESTAMP_LEN + 2 * self.offset_len()
    }
}

/// Fields of a record row, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Seconds,
    Micros,
    Start,
    Stop,
    EtherType,
    L2Proto,
    SrcHost,
    DstHost,
    SrcPort,
    DstPort,
}

/// Byte ranges of a binary record row for one version/address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    offset_len: usize,
    addr_len: usize,
}

impl RowLayout {
    pub fn new(version: IndexVersion, ether_type: u16) -> Self {
        let addr_len = if ether_type == ETHERTYPE_IPV6 {
            IPV6_ADDR_LEN
        } else {
            IPV4_ADDR_LEN
        };
        Self {
            offset_len: version.offset_len(),
            addr_len,
        }
    }

    pub fn addr_len(&self) -> usize {
        self.addr_len
    }

    pub fn size(&self) -> usize {
        self.range(RowField::DstPort).end
    }

    pub fn range(&self, field: RowField) -> Range<usize> {
        let ether_type = TIMESTAMP_LEN + 2 * self.offset_len;
        let src_host = ether_type + ETHER_TYPE_LEN + L2_PROTO_LEN;
        let dst_host = src_host + self.addr_len;
        let src_port = dst_host + self.addr_len;
        match field {
            RowField::Seconds => 0..4,
            RowField::Micros => 4..TIMESTAMP_LEN,
            RowField::Start => TIMESTAMP_LEN..TIMESTAMP_LEN + self.offset_len,
            RowField::Stop => TIMESTAMP_LEN + self.offset_len..ether_type,
            RowField::EtherType => ether_type..ether_type + ETHER_TYPE_LEN,
            RowField::L2Proto => ether_type + ETHER_TYPE_LEN..src_host,
            RowField::SrcHost => src_host..dst_host,
            RowField::DstHost => dst_host..src_port,
            RowField::SrcPort => src_port..src_port + PORT_LEN,
            RowField::DstPort => src_port + PORT_LEN..src_port + 2 * PORT_LEN,
        }
    }
}
