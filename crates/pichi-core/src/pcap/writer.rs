use std::io::{self, Write};

use super::layout;

/// Writes a little-endian Ethernet pcap.
///
/// The global header is written on construction. Packets either come from
/// raw per-packet records copied out of another capture (`write_record`) or
/// from a timestamp and frame (`write_packet`).
///
/// # Examples
/// ```
/// use pichi_core::pcap::PcapWriter;
///
/// let mut writer = PcapWriter::new(Vec::new())?;
/// writer.write_packet(1, 0, &[0u8; 14])?;
/// let bytes = writer.into_inner();
/// assert_eq!(bytes.len(), 24 + 16 + 14);
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct PcapWriter<W: Write> {
    out: W,
    packets: u64,
    bytes: u64,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(&layout::OUTPUT_GLOBAL_HEADER)?;
        Ok(Self {
            out,
            packets: 0,
            bytes: 0,
        })
    }

    /// Append one per-packet record (16-byte header plus frame) verbatim.
    pub fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.out.write_all(record)?;
        self.packets += 1;
        self.bytes += record.len() as u64;
        Ok(())
    }

    pub fn write_packet(&mut self, seconds: u32, micros: u32, frame: &[u8]) -> io::Result<()> {
        let caplen = u32::try_from(frame.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        let mut record = Vec::with_capacity(layout::RECORD_HEADER_LEN + frame.len());
        record.extend_from_slice(&seconds.to_le_bytes());
        record.extend_from_slice(&micros.to_le_bytes());
        record.extend_from_slice(&caplen.to_le_bytes());
        record.extend_from_slice(&caplen.to_le_bytes());
        record.extend_from_slice(frame);
        self.write_record(&record)
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Record bytes written so far, global header excluded.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
