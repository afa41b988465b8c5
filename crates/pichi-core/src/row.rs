//! Record rows as yielded by the parser.
//!
//! A text index yields `TextRow`s whose fields are decoded eagerly; a binary
//! index yields `BinaryRow`s that keep the raw row bytes so filters can
//! compare byte strings without decoding. `Row` is the sum of both.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::format::error::FormatError;
use crate::format::layout::{IndexVersion, RowField, RowLayout};
use crate::format::record::{Record, be_u16, le_offset};

/// Row with decoded fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRow {
    source: Arc<str>,
    record: Record,
}

impl TextRow {
    pub fn new(source: Arc<str>, record: Record) -> Self {
        Self { source, record }
    }

    /// Parse one pipe-delimited line; the source name comes from the line.
    pub fn from_text(line: &str) -> Result<Self, String> {
        let (source, record) = Record::parse_text_line(line)?;
        Ok(Self::new(Arc::from(source), record))
    }

    pub fn from_binary(
        source: Arc<str>,
        raw: &[u8],
        version: IndexVersion,
    ) -> Result<Self, FormatError> {
        Ok(Self::new(source, Record::decode(raw, version)?))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Capture time, when representable.
    pub fn datetime(&self) -> Option<OffsetDateTime> {
        let ts = self.record.timestamp;
        let nanos = i128::from(ts.seconds) * 1_000_000_000 + i128::from(ts.micros) * 1_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }

    pub fn src_host(&self) -> IpAddr {
        self.record.src_host
    }

    pub fn dst_host(&self) -> IpAddr {
        self.record.dst_host
    }

    pub fn src_port(&self) -> u16 {
        self.record.src_port
    }

    pub fn dst_port(&self) -> u16 {
        self.record.dst_port
    }

    pub fn ether_type(&self) -> u16 {
        self.record.ether_type
    }

    pub fn l2_proto(&self) -> u8 {
        self.record.l2_proto
    }

    pub fn start(&self) -> u64 {
        self.record.start
    }

    pub fn stop(&self) -> u64 {
        self.record.stop
    }

    pub fn bytes(&self) -> u64 {
        self.record.bytes()
    }

    pub fn to_binary(&self) -> Result<BinaryRow, FormatError> {
        let raw = self.record.encode(IndexVersion::V3)?;
        BinaryRow::from_binary(self.source.clone(), raw, IndexVersion::V3)
    }
}

impl fmt::Display for TextRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record.to_text_line(&self.source))
    }
}

/// Row kept as its raw index bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRow {
    source: Arc<str>,
    version: IndexVersion,
    layout: RowLayout,
    raw: Vec<u8>,
}

impl BinaryRow {
    /// Wrap one raw row, checking its size against its EtherType.
    pub fn from_binary(
        source: Arc<str>,
        raw: Vec<u8>,
        version: IndexVersion,
    ) -> Result<Self, FormatError> {
        let ether_type_at = version.ether_type_offset();
        let ether_type = raw
            .get(ether_type_at..ether_type_at + 2)
            .map(be_u16)
            .ok_or(FormatError::Truncated {
                what: "record row",
                offset: 0,
                needed: ether_type_at + 2,
                actual: raw.len(),
            })?;
        let layout = RowLayout::new(version, ether_type);
        if raw.len() != layout.size() {
            return Err(FormatError::Truncated {
                what: "record row",
                offset: 0,
                needed: layout.size(),
                actual: raw.len(),
            });
        }
        let row = Self {
            source,
            version,
            layout,
            raw,
        };
        let (start, stop) = (row.start(), row.stop());
        if stop <= start {
            return Err(FormatError::EmptyRange { start, stop });
        }
        Ok(row)
    }

    pub fn from_text(line: &str) -> Result<Self, String> {
        TextRow::from_text(line)?
            .to_binary()
            .map_err(|err| err.to_string())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Raw bytes of one field.
    pub fn field(&self, field: RowField) -> &[u8] {
        &self.raw[self.layout.range(field)]
    }

    pub fn start(&self) -> u64 {
        le_offset(self.field(RowField::Start))
    }

    pub fn stop(&self) -> u64 {
        le_offset(self.field(RowField::Stop))
    }

    pub fn bytes(&self) -> u64 {
        self.stop().saturating_sub(self.start())
    }

    pub fn to_text(&self) -> Result<TextRow, FormatError> {
        TextRow::from_binary(self.source.clone(), &self.raw, self.version)
    }
}

impl fmt::Display for BinaryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Ok(row) => fmt::Display::fmt(&row, f),
            Err(_) => write!(f, "<malformed row {:02x?}>", self.raw),
        }
    }
}

/// A record row of either representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Text(TextRow),
    Binary(BinaryRow),
}

impl Row {
    pub fn source(&self) -> &str {
        match self {
            Row::Text(row) => row.source(),
            Row::Binary(row) => row.source(),
        }
    }

    pub fn start(&self) -> u64 {
        match self {
            Row::Text(row) => row.start(),
            Row::Binary(row) => row.start(),
        }
    }

    pub fn stop(&self) -> u64 {
        match self {
            Row::Text(row) => row.stop(),
            Row::Binary(row) => row.stop(),
        }
    }

    /// Length of the packet's pcap record, header included.
    pub fn bytes(&self) -> u64 {
        match self {
            Row::Text(row) => row.bytes(),
            Row::Binary(row) => row.bytes(),
        }
    }

    /// Decoded view of the row.
    pub fn to_record(&self) -> Result<Record, FormatError> {
        match self {
            Row::Text(row) => Ok(row.record().clone()),
            Row::Binary(row) => Ok(row.to_text()?.record().clone()),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::Text(row) => fmt::Display::fmt(row, f),
            Row::Binary(row) => fmt::Display::fmt(row, f),
        }
    }
}
