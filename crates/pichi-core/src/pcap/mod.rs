//! Legacy pcap access.
//!
//! The indexer streams captures through `PcapStream`, which records the byte
//! range of every packet; the extractor writes its output with `PcapWriter`.

pub mod error;
pub mod layout;
pub mod reader;
pub mod writer;

pub use error::PcapError;
pub use reader::{PacketFrame, PcapStream};
pub use writer::PcapWriter;
