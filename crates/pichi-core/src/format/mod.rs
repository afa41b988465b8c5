//! Index byte format.
//!
//! `layout` holds the magic numbers, separators and row geometry shared by
//! the indexer and the parser; `record` converts between decoded records and
//! their binary/text rows; `reader` provides the look-ahead byte access the
//! parser uses to find section boundaries.

pub mod error;
pub mod layout;
pub mod reader;
pub mod record;

use serde::{Deserialize, Serialize};

pub use error::FormatError;
pub use layout::IndexVersion;
pub use record::{Record, Timestamp};

/// Physical representation of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    /// Header, file sections of fixed-width rows, footer.
    #[default]
    Binary,
    /// One pipe-delimited line per packet.
    Text,
}

impl IndexFormat {
    /// File extension used for indexes of this format.
    pub fn extension(self) -> &'static str {
        match self {
            IndexFormat::Binary => "pidx",
            IndexFormat::Text => "ptxt",
        }
    }
}
