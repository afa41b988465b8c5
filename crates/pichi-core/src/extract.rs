//! Filtered extraction from indexed captures.
//!
//! The index is read section by section; every row that passes the filter set
//! has its byte range `[start, stop)` copied verbatim from the source pcap
//! into the output pcap. Source captures are opened lazily, on the first
//! matching row of their section, and the output is created on the first
//! match overall.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use pcap_parser::{Linktype, parse_pcap_header};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bloom::BloomFilter;
use crate::error::PichiError;
use crate::filter::{FilterExpr, FilterSet, required_hosts};
use crate::format::FormatError;
use crate::io::{OutputSink, output_path};
use crate::parser::{FileIndex, IndexParser, ParserOptions};
use crate::pcap::layout::{GLOBAL_HEADER_LEN, GZIP_MAGIC};
use crate::pcap::{PcapError, PcapWriter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOptions {
    pub index: PathBuf,
    /// Output pcap; `.gz` is appended when `compress` is set.
    pub output: PathBuf,
    /// Filter expression; `None` copies every packet.
    pub filter: Option<String>,
    /// Directory joined in front of every source name recorded in the index.
    pub prefix: Option<PathBuf>,
    pub compress: bool,
    /// Bloom sidecar consulted before the index is opened.
    pub bloom: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractReport {
    /// Packets written to the output.
    pub packets: u64,
    /// Packet record bytes copied, global header excluded.
    pub bytes: u64,
    pub files_visited: u64,
    /// Sections whose source capture could not be read.
    pub files_skipped: u64,
    /// Output written, `None` when nothing matched.
    pub output: Option<PathBuf>,
    /// The bloom sidecar ruled out a required host.
    pub bloom_rejected: bool,
}

/// Write every packet of `options.index` that passes `options.filter` into
/// `options.output`.
///
/// The output is only created when at least one packet matches, and is
/// removed again if a fatal error interrupts the extraction.
///
/// # Errors
/// Filter errors are returned before any file is opened. A malformed index,
/// a source capture shorter than a row's `stop` and output write failures
/// are fatal. Source captures that are missing or unreadable are logged and
/// their section is skipped.
pub fn extract(options: &ExtractOptions) -> Result<ExtractReport, PichiError> {
    let exprs = match options.filter.as_deref() {
        Some(expression) => FilterExpr::parse_list(expression)?,
        None => Vec::new(),
    };

    if let Some(bloom_path) = options.bloom.as_deref() {
        let bloom = BloomFilter::read_from(bloom_path)?;
        if let Some(missing) = required_hosts(exprs.iter())
            .into_iter()
            .find(|host| !bloom.contains_addr(host))
        {
            info!(host = %missing, "required host absent from bloom sidecar, nothing to extract");
            return Ok(ExtractReport {
                bloom_rejected: true,
                ..ExtractReport::default()
            });
        }
    }

    let mut parser = IndexParser::open(&options.index, ParserOptions::default())?;
    let filters = FilterSet::compile(exprs, parser.format());
    let written = output_path(&options.output, options.compress);
    let mut extraction = Extraction {
        filters: &filters,
        prefix: options.prefix.as_deref(),
        written: &written,
        compress: options.compress,
        output: None,
        report: ExtractReport::default(),
    };

    match extraction.run(&mut parser) {
        Ok(()) => extraction.finish(),
        Err(err) => {
            extraction.discard();
            Err(err)
        }
    }
}

/// Print every row of `index` passing `filter` in the text layout.
///
/// Returns the number of rows written.
pub fn dump_rows<W: Write>(
    index: &Path,
    filter: Option<&str>,
    out: &mut W,
) -> Result<u64, PichiError> {
    let exprs = match filter {
        Some(expression) => FilterExpr::parse_list(expression)?,
        None => Vec::new(),
    };
    let mut parser = IndexParser::open(index, ParserOptions::default())?;
    let filters = FilterSet::compile(exprs, parser.format());
    let stdout = Path::new("-");
    let mut rows = 0;
    while let Some(file) = parser.next_file()? {
        for row in file {
            let row = row?;
            if filters.matches(&row) {
                writeln!(out, "{row}").map_err(PichiError::io(stdout))?;
                rows += 1;
            }
        }
    }
    out.flush().map_err(PichiError::io(stdout))?;
    Ok(rows)
}

struct Extraction<'a> {
    filters: &'a FilterSet,
    prefix: Option<&'a Path>,
    written: &'a Path,
    compress: bool,
    output: Option<PcapWriter<OutputSink>>,
    report: ExtractReport,
}

impl Extraction<'_> {
    fn run<R: Read>(&mut self, parser: &mut IndexParser<R>) -> Result<(), PichiError> {
        while let Some(file) = parser.next_file()? {
            self.report.files_visited += 1;
            let source = match self.prefix {
                Some(prefix) => prefix.join(file.source()),
                None => PathBuf::from(file.source()),
            };
            self.copy_section(file, &source)?;
        }
        Ok(())
    }

    fn copy_section<R: Read>(
        &mut self,
        file: FileIndex<'_, R>,
        path: &Path,
    ) -> Result<(), PichiError> {
        let mut source: Option<SourcePcap> = None;
        let mut record = Vec::new();
        let mut copied = 0u64;
        for row in file {
            let row = row?;
            if !self.filters.matches(&row) {
                continue;
            }
            if source.is_none() {
                match SourcePcap::open(path) {
                    Ok(opened) => source = Some(opened),
                    Err(err) => {
                        error!(source = %path.display(), error = %err, "cannot read source pcap, skipping section");
                        self.report.files_skipped += 1;
                        return Ok(());
                    }
                }
            }
            let Some(pcap) = source.as_mut() else {
                continue;
            };

            if let Err(err) = pcap.read_range(row.start(), row.bytes(), &mut record) {
                if err.kind() == ErrorKind::UnexpectedEof {
                    return Err(FormatError::SourceTruncated {
                        path: path.to_path_buf(),
                        start: row.start(),
                        stop: row.stop(),
                    }
                    .into());
                }
                error!(source = %path.display(), error = %err, "source pcap read failed, skipping rest of section");
                self.report.files_skipped += 1;
                return Ok(());
            }

            if self.output.is_none() {
                self.open_output()?;
            }
            let Some(output) = self.output.as_mut() else {
                continue;
            };
            output
                .write_record(&record)
                .map_err(PichiError::io(self.written))?;
            copied += 1;
        }
        debug!(source = %path.display(), packets = copied, "section extracted");
        Ok(())
    }

    fn open_output(&mut self) -> Result<(), PichiError> {
        let sink = OutputSink::create(self.written, self.compress).map_err(PichiError::io(self.written))?;
        let writer = PcapWriter::new(sink).map_err(PichiError::io(self.written))?;
        debug!(output = %self.written.display(), compress = self.compress, "output created");
        self.output = Some(writer);
        Ok(())
    }

    fn finish(self) -> Result<ExtractReport, PichiError> {
        let mut report = self.report;
        if let Some(output) = self.output {
            report.packets = output.packets();
            report.bytes = output.bytes();
            if let Err(err) = output.into_inner().finish() {
                remove_partial(self.written);
                return Err(PichiError::Io {
                    path: self.written.to_path_buf(),
                    source: err,
                });
            }
            report.output = Some(self.written.to_path_buf());
        }
        info!(
            packets = report.packets,
            files = report.files_visited,
            skipped = report.files_skipped,
            "extraction finished"
        );
        Ok(report)
    }

    fn discard(self) {
        if let Some(output) = self.output {
            drop(output);
            remove_partial(self.written);
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "could not remove partial output");
    }
}

/// Source capture opened for range reads.
///
/// Compressed captures are read forward only; rows of a section are in
/// capture order, so skipping ahead is enough.
enum SourcePcap {
    Plain {
        reader: BufReader<File>,
        position: u64,
    },
    Gzip {
        decoder: GzDecoder<BufReader<File>>,
        position: u64,
    },
}

impl SourcePcap {
    /// Open `path` and check its global header.
    fn open(path: &Path) -> Result<Self, PcapError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut source = if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
            SourcePcap::Gzip {
                decoder: GzDecoder::new(reader),
                position: 0,
            }
        } else {
            SourcePcap::Plain {
                reader,
                position: 0,
            }
        };
        let mut raw = Vec::with_capacity(GLOBAL_HEADER_LEN);
        source.read_range(0, GLOBAL_HEADER_LEN as u64, &mut raw)?;
        let (_, header) = parse_pcap_header(&raw).map_err(|e| PcapError::Pcap {
            context: "source pcap global header",
            message: format!("{e:?}"),
        })?;
        if header.is_bigendian()
            || header.is_nanosecond_precision()
            || header.network != Linktype::ETHERNET
        {
            warn!(
                source = %path.display(),
                linktype = header.network.0,
                "source pcap differs from the little-endian microsecond Ethernet output header"
            );
        }
        Ok(source)
    }

    /// Fill `buf` with the `len` bytes starting at `start`.
    fn read_range(&mut self, start: u64, len: u64, buf: &mut Vec<u8>) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(ErrorKind::InvalidData, "record range too large"))?;
        buf.clear();
        buf.resize(len, 0);
        match self {
            SourcePcap::Plain { reader, position } => {
                if *position != start {
                    reader.seek(SeekFrom::Start(start))?;
                }
                reader.read_exact(buf)?;
                *position = start + len as u64;
            }
            SourcePcap::Gzip { decoder, position } => {
                if start < *position {
                    return Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        "backward seek in a compressed source pcap",
                    ));
                }
                let gap = start - *position;
                let skipped = io::copy(&mut decoder.by_ref().take(gap), &mut io::sink())?;
                if skipped < gap {
                    return Err(ErrorKind::UnexpectedEof.into());
                }
                decoder.read_exact(buf)?;
                *position = start + len as u64;
            }
        }
        Ok(())
    }
}
