//! Index reading.
//!
//! `IndexParser` owns the index stream and yields one `FileIndex` per file
//! section; each `FileIndex` mutably borrows the parser, so a section must be
//! finished (or dropped) before the next one is requested. Unread rows of a
//! dropped section are skipped by `next_file`.

mod file_index;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::error::PichiError;
use crate::format::layout::{
    ETHER_TYPE_LEN, FILE_SEPARATOR, FOOTER_SEPARATOR, HEADER_FIXED_LEN, INDEX_MAGIC, RowLayout,
    SEPARATOR_LEN, TEXT_DELIMITER,
};
use crate::format::reader::IndexReader;
use crate::format::record::be_u16;
use crate::format::{FormatError, IndexFormat, IndexVersion, Record};
use crate::io::InputStream;
use crate::row::{BinaryRow, Row, TextRow};
use crate::{FileSummary, IndexSummary};

pub use file_index::FileIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserOptions {
    /// Read the whole (decompressed) index into memory before parsing.
    pub load_to_memory: bool,
    /// Keep every parsed row; see `IndexParser::stored_rows`.
    pub store: bool,
}

/// Decoded binary index header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: IndexVersion,
    pub header_len: u8,
    /// Creation time, seconds since the Unix epoch.
    pub created: u32,
    pub name: String,
}

impl IndexHeader {
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(i64::from(self.created)).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub files: u8,
    pub packets: u32,
}

/// Lazy reader over an index of either format.
///
/// # Examples
/// ```no_run
/// use std::path::Path;
///
/// use pichi_core::{IndexParser, ParserOptions};
///
/// let mut parser = IndexParser::open(Path::new("capture.pidx"), ParserOptions::default())?;
/// while let Some(file) = parser.next_file()? {
///     let source = file.source().to_string();
///     let mut packets = 0;
///     for row in file {
///         row?;
///         packets += 1;
///     }
///     println!("{source}: {packets} packets");
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct IndexParser<R> {
    reader: IndexReader<R>,
    format: IndexFormat,
    header: Option<IndexHeader>,
    footer: Option<Footer>,
    section: Option<Arc<str>>,
    finished: bool,
    files_seen: u64,
    rows_seen: u64,
    line: u64,
    store: bool,
    stored: Vec<Row>,
}

impl IndexParser<InputStream> {
    /// Open an index file, decompressing it when it starts with the gzip
    /// magic.
    pub fn open(path: &Path, options: ParserOptions) -> Result<Self, PichiError> {
        let mut input = InputStream::open(path).map_err(PichiError::io(path))?;
        if options.load_to_memory {
            input = input.into_memory().map_err(PichiError::io(path))?;
        }
        debug!(
            path = %path.display(),
            compressed = input.is_compressed(),
            in_memory = options.load_to_memory,
            "opening index"
        );
        Ok(Self::from_reader(input, options)?)
    }
}

impl<R: Read> IndexParser<R> {
    /// Detect the format and read the binary header.
    ///
    /// # Errors
    /// `BadMagic` when the stream is neither a binary index nor starts with a
    /// valid text row; `UnsupportedVersion` and `BadHeaderLength` for a bad
    /// binary header.
    pub fn from_reader(inner: R, options: ParserOptions) -> Result<Self, FormatError> {
        let mut reader = IndexReader::new(inner);
        let lead = reader.peek(INDEX_MAGIC.len())?.to_vec();
        let (format, header) = if lead == INDEX_MAGIC {
            (IndexFormat::Binary, Some(read_header(&mut reader)?))
        } else {
            let valid_text = match reader.peek_line()? {
                Some(line) => std::str::from_utf8(line)
                    .ok()
                    .is_some_and(|line| Record::parse_text_line(line).is_ok()),
                None => false,
            };
            if !valid_text {
                return Err(FormatError::BadMagic { found: lead });
            }
            (IndexFormat::Text, None)
        };
        Ok(Self {
            reader,
            format,
            header,
            footer: None,
            section: None,
            finished: false,
            files_seen: 0,
            rows_seen: 0,
            line: 0,
            store: options.store,
            stored: Vec::new(),
        })
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    /// Binary header; `None` for a text index.
    pub fn header(&self) -> Option<&IndexHeader> {
        self.header.as_ref()
    }

    /// Footer, once the parser has reached it.
    pub fn footer(&self) -> Option<Footer> {
        self.footer
    }

    /// Rows retained so far when parsing with `store`.
    pub fn stored_rows(&self) -> &[Row] {
        &self.stored
    }

    pub fn take_stored_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.stored)
    }

    /// Advance to the next file section.
    ///
    /// Rows left unread in the current section are skipped first.
    pub fn next_file(&mut self) -> Result<Option<FileIndex<'_, R>>, FormatError> {
        while self.next_row()?.is_some() {}
        if self.finished {
            return Ok(None);
        }
        let source = match self.format {
            IndexFormat::Binary => self.open_binary_section()?,
            IndexFormat::Text => self.open_text_section()?,
        };
        match source {
            Some(source) => {
                self.files_seen += 1;
                self.section = Some(Arc::clone(&source));
                Ok(Some(FileIndex::new(self, source)))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Read every remaining section and check the footer counts.
    ///
    /// # Errors
    /// `FooterMismatch` when the footer's file or packet count differs from
    /// what the index actually holds.
    pub fn parse_whole(&mut self) -> Result<IndexSummary, FormatError> {
        let mut files = Vec::new();
        while let Some(mut file) = self.next_file()? {
            let mut summary = FileSummary {
                source: file.source().to_string(),
                packets: 0,
                bytes: 0,
            };
            for row in &mut file {
                let row = row?;
                summary.packets += 1;
                summary.bytes += row.bytes();
            }
            files.push(summary);
        }

        if let Some(footer) = self.footer {
            if u64::from(footer.files) != self.files_seen {
                return Err(FormatError::FooterMismatch {
                    field: "file count",
                    expected: u64::from(footer.files),
                    actual: self.files_seen,
                });
            }
            if u64::from(footer.packets) != self.rows_seen {
                return Err(FormatError::FooterMismatch {
                    field: "packet count",
                    expected: u64::from(footer.packets),
                    actual: self.rows_seen,
                });
            }
        }

        Ok(IndexSummary {
            format: self.format,
            version: self.header.as_ref().map(|header| header.version.as_byte()),
            name: self.header.as_ref().map(|header| header.name.clone()),
            created_at: self
                .header
                .as_ref()
                .and_then(IndexHeader::created_at)
                .and_then(|created| created.format(&Rfc3339).ok()),
            packets_total: files.iter().map(|file| file.packets).sum(),
            bytes_total: files.iter().map(|file| file.bytes).sum(),
            files,
        })
    }

    fn open_binary_section(&mut self) -> Result<Option<Arc<str>>, FormatError> {
        let offset = self.reader.offset();
        let marker = self.reader.peek(SEPARATOR_LEN)?.to_vec();
        if marker.is_empty() {
            return Err(FormatError::MissingFooter);
        }
        if marker == FILE_SEPARATOR {
            self.reader.consume(SEPARATOR_LEN);
            let len = self.reader.read_u8("source name length")?;
            let name = self.reader.read_string(usize::from(len), "source name")?;
            debug!(source = %name, offset, "file section");
            return Ok(Some(Arc::from(name)));
        }
        if marker == FOOTER_SEPARATOR {
            self.reader.consume(SEPARATOR_LEN);
            let files = self.reader.read_u8("footer file count")?;
            let packets = self.reader.read_u32_le("footer packet count")?;
            self.footer = Some(Footer { files, packets });
            let trailing_at = self.reader.offset();
            let trailing = self.reader.peek(SEPARATOR_LEN)?;
            if !trailing.is_empty() {
                return Err(FormatError::BadSeparator {
                    found: trailing.to_vec(),
                    offset: trailing_at,
                });
            }
            return Ok(None);
        }
        Err(FormatError::BadSeparator {
            found: marker,
            offset,
        })
    }

    fn open_text_section(&mut self) -> Result<Option<Arc<str>>, FormatError> {
        loop {
            let line = match self.reader.peek_line()? {
                Some(line) => line,
                None => return Ok(None),
            };
            if line.is_empty() {
                self.reader.consume_line();
                self.line += 1;
                continue;
            }
            let line = std::str::from_utf8(line)
                .map_err(|_| FormatError::InvalidUtf8 { what: "text row" })?;
            let source = line.split(TEXT_DELIMITER).nth(1).unwrap_or_default();
            return Ok(Some(Arc::from(source)));
        }
    }

    /// Next row of the current section, `None` at the section boundary.
    pub(crate) fn next_row(&mut self) -> Result<Option<Row>, FormatError> {
        let Some(section) = self.section.clone() else {
            return Ok(None);
        };
        let row = match self.format {
            IndexFormat::Binary => self.next_binary_row(section)?,
            IndexFormat::Text => self.next_text_row(section)?,
        };
        match row {
            Some(row) => {
                self.rows_seen += 1;
                if self.store {
                    self.stored.push(row.clone());
                }
                Ok(Some(row))
            }
            None => {
                self.section = None;
                Ok(None)
            }
        }
    }

    fn next_binary_row(&mut self, section: Arc<str>) -> Result<Option<Row>, FormatError> {
        let version = self
            .header
            .as_ref()
            .map(|header| header.version)
            .unwrap_or_default();
        let offset = self.reader.offset();
        let marker = self.reader.peek(SEPARATOR_LEN)?;
        if marker.is_empty() {
            return Err(FormatError::MissingFooter);
        }
        if marker == FILE_SEPARATOR || marker == FOOTER_SEPARATOR {
            return Ok(None);
        }
        let ether_type_at = version.ether_type_offset();
        let lead = self.reader.peek(ether_type_at + ETHER_TYPE_LEN)?;
        if lead.len() < ether_type_at + ETHER_TYPE_LEN {
            return Err(FormatError::Truncated {
                what: "record row",
                offset,
                needed: ether_type_at + ETHER_TYPE_LEN,
                actual: lead.len(),
            });
        }
        let ether_type = be_u16(&lead[ether_type_at..]);
        let size = RowLayout::new(version, ether_type).size();
        let raw = self.reader.take(size, "record row")?;
        Ok(Some(Row::Binary(BinaryRow::from_binary(section, raw, version)?)))
    }

    fn next_text_row(&mut self, section: Arc<str>) -> Result<Option<Row>, FormatError> {
        loop {
            let line_no = self.line + 1;
            let parsed = match self.reader.peek_line()? {
                None => return Ok(None),
                Some([]) => None,
                Some(line) => {
                    let line = std::str::from_utf8(line)
                        .map_err(|_| FormatError::InvalidUtf8 { what: "text row" })?;
                    Some(Record::parse_text_line(line).map_err(|reason| {
                        FormatError::InvalidTextRow {
                            line: line_no,
                            reason,
                        }
                    })?)
                }
            };
            let Some((source, record)) = parsed else {
                self.reader.consume_line();
                self.line += 1;
                continue;
            };
            if *source != *section {
                return Ok(None);
            }
            self.reader.consume_line();
            self.line += 1;
            return Ok(Some(Row::Text(TextRow::new(section, record))));
        }
    }
}

fn read_header<R: Read>(reader: &mut IndexReader<R>) -> Result<IndexHeader, FormatError> {
    reader.consume(INDEX_MAGIC.len());
    let version_byte = reader.read_u8("index version")?;
    let version = IndexVersion::from_byte(version_byte).ok_or(FormatError::UnsupportedVersion {
        version: version_byte,
    })?;
    let header_len = reader.read_u8("index header length")?;
    if usize::from(header_len) < HEADER_FIXED_LEN {
        return Err(FormatError::BadHeaderLength { length: header_len });
    }
    let created = reader.read_u32_le("index creation time")?;
    let name = reader.read_string(usize::from(header_len) - HEADER_FIXED_LEN, "index name")?;
    Ok(IndexHeader {
        version,
        header_len,
        created,
        name,
    })
}
