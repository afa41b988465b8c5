use std::io::{ErrorKind, Read};

use pcap_parser::{Linktype, PcapHeader, parse_pcap_header};
use tracing::warn;

use super::error::PcapError;
use super::layout;

/// One packet as found in the source pcap.
#[derive(Debug)]
pub struct PacketFrame<'a> {
    /// File offset of the 16-byte per-packet header.
    pub start: u64,
    /// File offset just past the frame data.
    pub stop: u64,
    pub seconds: u32,
    pub micros: u32,
    pub data: &'a [u8],
}

/// Sequential reader over a legacy pcap stream that tracks file offsets.
///
/// Works on any `Read`, so gzip-compressed captures are handled by the caller
/// wrapping the file in a decoder; offsets always refer to the decompressed
/// bytes.
pub struct PcapStream<R> {
    inner: R,
    header: PcapHeader,
    offset: u64,
    frame: Vec<u8>,
}

impl<R: Read> PcapStream<R> {
    /// Read and validate the 24-byte global header.
    ///
    /// # Errors
    /// Returns `PcapError::Io` when the header cannot be read and
    /// `PcapError::Pcap` when its magic number is not a pcap magic.
    pub fn new(mut inner: R) -> Result<Self, PcapError> {
        let mut raw = [0u8; layout::GLOBAL_HEADER_LEN];
        inner.read_exact(&mut raw)?;
        let (_, header) = parse_pcap_header(&raw).map_err(|e| PcapError::Pcap {
            context: "pcap global header",
            message: format!("{e:?}"),
        })?;
        Ok(Self {
            inner,
            header,
            offset: layout::GLOBAL_HEADER_LEN as u64,
            frame: Vec::new(),
        })
    }

    pub fn linktype(&self) -> Linktype {
        self.header.network
    }

    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    /// Read the next packet.
    ///
    /// A missing or partial per-packet header is the normal end of a capture
    /// and yields `Ok(None)`. A frame cut short by end of file also ends the
    /// capture (with a warning) and is not returned.
    pub fn next_frame(&mut self) -> Result<Option<PacketFrame<'_>>, PcapError> {
        let mut raw = [0u8; layout::RECORD_HEADER_LEN];
        let read = read_full(&mut self.inner, &mut raw)?;
        if read < layout::RECORD_HEADER_LEN {
            if read > 0 {
                warn!(offset = self.offset, read, "partial packet header at end of capture");
            }
            return Ok(None);
        }

        let seconds = self.decode_u32(&raw[layout::TS_SEC_RANGE]);
        let fraction = self.decode_u32(&raw[layout::TS_FRAC_RANGE]);
        let caplen = self.decode_u32(&raw[layout::CAPLEN_RANGE]);
        let micros = if self.header.is_nanosecond_precision() {
            fraction / 1_000
        } else {
            fraction
        };

        self.frame.clear();
        let copied = (&mut self.inner)
            .take(u64::from(caplen))
            .read_to_end(&mut self.frame)?;
        if copied < caplen as usize {
            warn!(
                offset = self.offset,
                caplen, copied, "truncated frame at end of capture"
            );
            return Ok(None);
        }

        let start = self.offset;
        let stop = start + layout::RECORD_HEADER_LEN as u64 + u64::from(caplen);
        self.offset = stop;
        Ok(Some(PacketFrame {
            start,
            stop,
            seconds,
            micros,
            data: &self.frame,
        }))
    }

    fn decode_u32(&self, bytes: &[u8]) -> u32 {
        let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if self.header.is_bigendian() {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, PcapError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}
