use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bloom::BloomError;
use crate::filter::FilterError;
use crate::format::FormatError;
use crate::pcap::PcapError;

/// Error returned by the indexing, parsing and extraction entry points.
#[derive(Debug, Error)]
pub enum PichiError {
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("{}: {source}", path.display())]
    Pcap { path: PathBuf, source: PcapError },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Bloom(#[from] BloomError),
}

impl PichiError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self {
        move |source| PichiError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn pcap(path: &Path) -> impl FnOnce(PcapError) -> Self {
        move |source| PichiError::Pcap {
            path: path.to_path_buf(),
            source,
        }
    }
}
