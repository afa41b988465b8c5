use std::io::Read;
use std::sync::Arc;

use super::IndexParser;
use crate::format::FormatError;
use crate::row::Row;

/// Rows of one file section.
///
/// Borrows its parser mutably: the parser cannot advance while a
/// `FileIndex` is alive. Iteration stops at the next section boundary and
/// does not consume it.
pub struct FileIndex<'p, R> {
    parser: &'p mut IndexParser<R>,
    source: Arc<str>,
    done: bool,
}

impl<'p, R: Read> FileIndex<'p, R> {
    pub(super) fn new(parser: &'p mut IndexParser<R>, source: Arc<str>) -> Self {
        Self {
            parser,
            source,
            done: false,
        }
    }

    /// Source pcap name recorded in the section header.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl<R: Read> Iterator for FileIndex<'_, R> {
    type Item = Result<Row, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parser.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
