use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing index bytes.
///
/// # Examples
/// ```
/// use pichi_core::FormatError;
///
/// let err = FormatError::UnsupportedVersion { version: 7 };
/// assert!(err.to_string().contains("unsupported index version"));
/// ```
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad index magic: {found:02x?}")]
    BadMagic { found: Vec<u8> },
    #[error("unsupported index version: {version}")]
    UnsupportedVersion { version: u8 },
    #[error("invalid index header length: {length}")]
    BadHeaderLength { length: u8 },
    #[error("unexpected section marker {found:02x?} at offset {offset}")]
    BadSeparator { found: Vec<u8>, offset: u64 },
    #[error("truncated {what} at offset {offset}: need {needed} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        offset: u64,
        needed: usize,
        actual: usize,
    },
    #[error("index ends without a footer")]
    MissingFooter,
    #[error("footer {field} mismatch: footer says {expected}, index holds {actual}")]
    FooterMismatch {
        field: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("invalid UTF-8 in {what}")]
    InvalidUtf8 { what: &'static str },
    #[error("invalid text row at line {line}: {reason}")]
    InvalidTextRow { line: u64, reason: String },
    #[error("index header would be {length} bytes, the limit is 255")]
    HeaderTooLong { length: usize },
    #[error("source name is {length} bytes, the limit is 255")]
    NameTooLong { length: usize },
    #[error("{count} source files do not fit one index, the limit is 255")]
    TooManyFiles { count: usize },
    #[error("{count} packets do not fit the index footer")]
    TooManyPackets { count: u64 },
    #[error("offset {offset} does not fit a version {version} index")]
    OffsetOverflow { offset: u64, version: u8 },
    #[error("source name cannot be stored in a text index: {name:?}")]
    InvalidSourceName { name: String },
    #[error("record range {start}..{stop} is empty")]
    EmptyRange { start: u64, stop: u64 },
    #[error("address family does not match EtherType {ether_type:#06x}")]
    AddressFamily { ether_type: u16 },
    #[error("source pcap {path} ends before byte {stop} needed by the record at {start}")]
    SourceTruncated { path: PathBuf, start: u64, stop: u64 },
}
