//! Pichi core library: pcap indexing and index-driven packet extraction.
//!
//! An index records, for every packet of one or more source captures, the
//! byte range of its pcap record plus the fields that identify its flow
//! (EtherType, L4 protocol, addresses, ports). Extraction reads an index,
//! evaluates a filter expression against each row and copies the matching
//! byte ranges into a new capture without touching packet payloads.
//!
//! Layering follows the byte formats: `format` holds the index layout and
//! row codecs, `pcap` the capture reader and writer, `indexer` builds
//! indexes, `parser` reads them back, `filter` compiles expressions for text
//! or binary rows, and `extract` drives the copy.
//!
//! Invariants:
//! - Rows of a file section are in capture order and partition the capture:
//!   `stop[i] == start[i + 1]`.
//! - The footer counts equal the number of sections and rows.
//! - A filter matches the same rows whether compiled for text or binary rows.
//!
//! # Examples
//! ```no_run
//! use std::path::{Path, PathBuf};
//!
//! use pichi_core::{ExtractOptions, IndexOptions, extract, index_pcaps};
//!
//! index_pcaps(
//!     &[PathBuf::from("capture.pcap")],
//!     Path::new("capture.pidx"),
//!     &IndexOptions::default(),
//! )?;
//! let report = extract(&ExtractOptions {
//!     index: PathBuf::from("capture.pidx"),
//!     output: PathBuf::from("web.pcap"),
//!     filter: Some("port==80".to_string()),
//!     ..ExtractOptions::default()
//! })?;
//! println!("{} packets extracted", report.packets);
//! # Ok::<(), pichi_core::PichiError>(())
//! ```

use serde::{Deserialize, Serialize};

mod bloom;
mod error;
mod extract;
pub mod filter;
mod format;
mod indexer;
mod io;
mod parser;
pub mod pcap;
mod row;

pub use bloom::{BloomEfficiency, BloomError, BloomFilter};
pub use error::PichiError;
pub use extract::{ExtractOptions, ExtractReport, dump_rows, extract};
pub use filter::{FilterError, FilterSet};
pub use format::{FormatError, IndexFormat, IndexVersion, Record, Timestamp};
pub use indexer::{
    DEFAULT_BLOOM_FP_RATE, IndexArtifact, IndexMode, IndexOptions, IndexReport, IndexWriter,
    index_pcap, index_pcaps, index_stream,
};
pub use parser::{FileIndex, Footer, IndexHeader, IndexParser, ParserOptions};
pub use row::{BinaryRow, Row, TextRow};

/// Packet and byte totals of one file section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub source: String,
    pub packets: u64,
    pub bytes: u64,
}

/// Result of a full pass over an index.
///
/// # Examples
/// ```
/// use pichi_core::{IndexFormat, IndexSummary};
///
/// let summary = IndexSummary::default();
/// assert_eq!(summary.format, IndexFormat::Binary);
/// assert!(summary.files.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub format: IndexFormat,
    /// Binary index version; `None` for text indexes.
    pub version: Option<u8>,
    pub name: Option<String>,
    /// Creation time in RFC 3339.
    pub created_at: Option<String>,
    pub files: Vec<FileSummary>,
    pub packets_total: u64,
    pub bytes_total: u64,
}
