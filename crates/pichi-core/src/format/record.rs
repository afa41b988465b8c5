use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::error::FormatError;
use super::layout::{
    self, ETHERTYPE_IPV6, IPV6_ADDR_LEN, IndexVersion, RowField, RowLayout, TEXT_DELIMITER,
    TEXT_FIELD_COUNT,
};

/// Capture timestamp as stored in the pcap per-packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub micros: u32,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.seconds, self.micros)
    }
}

/// One packet's decoded index entry.
///
/// `start` is the file offset of the packet's 16-byte pcap header and `stop`
/// the offset just past its frame data, so `stop - start` bytes reproduce the
/// packet exactly.
///
/// # Examples
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
///
/// use pichi_core::{IndexVersion, Record, Timestamp};
///
/// let record = Record {
///     timestamp: Timestamp { seconds: 1, micros: 5 },
///     start: 24,
///     stop: 104,
///     ether_type: 0x0800,
///     l2_proto: 6,
///     src_host: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
///     dst_host: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
///     src_port: 1000,
///     dst_port: 80,
/// };
/// assert_eq!(record.bytes(), 80);
/// assert_eq!(record.encode(IndexVersion::V3)?.len(), 39);
/// # Ok::<(), pichi_core::FormatError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: Timestamp,
    pub start: u64,
    pub stop: u64,
    pub ether_type: u16,
    pub l2_proto: u8,
    pub src_host: IpAddr,
    pub dst_host: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl Record {
    pub fn bytes(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }

    /// Encode the fixed-width binary row for `version`.
    pub fn encode(&self, version: IndexVersion) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(RowLayout::new(version, self.ether_type).size());
        self.encode_into(version, &mut out)?;
        Ok(out)
    }

    pub fn encode_into(&self, version: IndexVersion, out: &mut Vec<u8>) -> Result<(), FormatError> {
        let row_layout = RowLayout::new(version, self.ether_type);
        out.extend_from_slice(&self.timestamp.seconds.to_le_bytes());
        out.extend_from_slice(&self.timestamp.micros.to_le_bytes());
        for offset in [self.start, self.stop] {
            match version {
                IndexVersion::V2 => {
                    let narrow = u32::try_from(offset).map_err(|_| FormatError::OffsetOverflow {
                        offset,
                        version: version.as_byte(),
                    })?;
                    out.extend_from_slice(&narrow.to_le_bytes());
                }
                IndexVersion::V3 => out.extend_from_slice(&offset.to_le_bytes()),
            }
        }
        out.extend_from_slice(&self.ether_type.to_be_bytes());
        out.push(self.l2_proto);
        for addr in [self.src_host, self.dst_host] {
            match (addr, row_layout.addr_len()) {
                (IpAddr::V4(v4), layout::IPV4_ADDR_LEN) => out.extend_from_slice(&v4.octets()),
                (IpAddr::V6(v6), IPV6_ADDR_LEN) => out.extend_from_slice(&v6.octets()),
                _ => {
                    return Err(FormatError::AddressFamily {
                        ether_type: self.ether_type,
                    });
                }
            }
        }
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        Ok(())
    }

    /// Decode a binary row. `raw` must hold exactly one row.
    pub fn decode(raw: &[u8], version: IndexVersion) -> Result<Self, FormatError> {
        let ether_type_at = version.ether_type_offset();
        let ether_type = raw
            .get(ether_type_at..ether_type_at + layout::ETHER_TYPE_LEN)
            .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
            .ok_or(FormatError::Truncated {
                what: "record row",
                offset: 0,
                needed: ether_type_at + layout::ETHER_TYPE_LEN,
                actual: raw.len(),
            })?;
        let row_layout = RowLayout::new(version, ether_type);
        if raw.len() != row_layout.size() {
            return Err(FormatError::Truncated {
                what: "record row",
                offset: 0,
                needed: row_layout.size(),
                actual: raw.len(),
            });
        }
        let field = |field: RowField| &raw[row_layout.range(field)];
        Ok(Record {
            timestamp: Timestamp {
                seconds: le_u32(field(RowField::Seconds)),
                micros: le_u32(field(RowField::Micros)),
            },
            start: le_offset(field(RowField::Start)),
            stop: le_offset(field(RowField::Stop)),
            ether_type,
            l2_proto: field(RowField::L2Proto)[0],
            src_host: addr_from_bytes(field(RowField::SrcHost)),
            dst_host: addr_from_bytes(field(RowField::DstHost)),
            src_port: be_u16(field(RowField::SrcPort)),
            dst_port: be_u16(field(RowField::DstPort)),
        })
    }

    /// Format the pipe-delimited text row (no trailing newline).
    pub fn to_text_line(&self, source: &str) -> String {
        format!(
            "{ts}|{source}|{start}|{stop}|{eth}|{proto}|{src}|{dst}|{sport}|{dport}",
            ts = self.timestamp,
            start = self.start,
            stop = self.stop,
            eth = self.ether_type,
            proto = self.l2_proto,
            src = self.src_host,
            dst = self.dst_host,
            sport = self.src_port,
            dport = self.dst_port,
        )
    }

    /// Parse one text row into its source name and record.
    pub fn parse_text_line(line: &str) -> Result<(String, Record), String> {
        let fields: Vec<&str> = line.split(TEXT_DELIMITER).collect();
        if fields.len() != TEXT_FIELD_COUNT {
            return Err(format!(
                "expected {TEXT_FIELD_COUNT} fields, found {}",
                fields.len()
            ));
        }
        let (seconds, micros) = fields[0]
            .split_once('.')
            .ok_or_else(|| format!("bad timestamp {:?}", fields[0]))?;
        let record = Record {
            timestamp: Timestamp {
                seconds: parse_field(seconds, "seconds")?,
                micros: parse_field(micros, "microseconds")?,
            },
            start: parse_field(fields[2], "start")?,
            stop: parse_field(fields[3], "stop")?,
            ether_type: parse_field(fields[4], "ethertype")?,
            l2_proto: parse_field(fields[5], "l2 protocol")?,
            src_host: parse_field(fields[6], "source host")?,
            dst_host: parse_field(fields[7], "destination host")?,
            src_port: parse_field(fields[8], "source port")?,
            dst_port: parse_field(fields[9], "destination port")?,
        };
        if record.stop <= record.start {
            return Err(format!("empty record range {}..{}", record.start, record.stop));
        }
        let expects_v6 = record.ether_type == ETHERTYPE_IPV6;
        if record.src_host.is_ipv6() != expects_v6 || record.dst_host.is_ipv6() != expects_v6 {
            return Err(format!(
                "address family does not match ethertype {}",
                record.ether_type
            ));
        }
        Ok((fields[1].to_string(), record))
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("bad {name} {value:?}"))
}

pub(crate) fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Little-endian offset of either width (4 bytes in v2, 8 in v3).
pub(crate) fn le_offset(bytes: &[u8]) -> u64 {
    let mut wide = [0u8; 8];
    wide[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(wide)
}

pub(crate) fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

pub(crate) fn addr_from_bytes(bytes: &[u8]) -> IpAddr {
    match <[u8; IPV6_ADDR_LEN]>::try_from(bytes) {
        Ok(octets) => IpAddr::V6(Ipv6Addr::from(octets)),
        Err(_) => IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])),
    }
}
