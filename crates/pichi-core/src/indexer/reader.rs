use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::Range;

/// Bounded access to one captured frame.
///
/// Every getter returns `None` when the requested bytes lie past the captured
/// length; the parser turns those into zero-valued fields.
pub struct FrameReader<'a> {
    frame: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self { frame }
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.frame.get(offset).copied()
    }

    pub fn read_u16_be(&self, offset: usize) -> Option<u16> {
        let bytes = self.read_slice(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_slice(&self, range: Range<usize>) -> Option<&'a [u8]> {
        self.frame.get(range)
    }

    pub fn read_ipv4(&self, range: Range<usize>) -> Option<Ipv4Addr> {
        let bytes: [u8; 4] = self.read_slice(range)?.try_into().ok()?;
        Some(Ipv4Addr::from(bytes))
    }

    pub fn read_ipv6(&self, range: Range<usize>) -> Option<Ipv6Addr> {
        let bytes: [u8; 16] = self.read_slice(range)?.try_into().ok()?;
        Some(Ipv6Addr::from(bytes))
    }
}
