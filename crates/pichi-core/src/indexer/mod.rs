//! Pcap to index conversion.
//!
//! Each source capture is streamed once through `PcapStream`; every frame is
//! decoded by `parser::parse_frame` (bounded by the captured length) and the
//! resulting record is appended to an `IndexWriter`. In combined mode all
//! inputs land in one index, each in its own file section; in individual mode
//! each input gets its own index inside the output directory.

pub mod layout;
pub mod parser;
pub mod reader;
pub mod writer;

use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use pcap_parser::Linktype;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::FileSummary;
use crate::bloom::BloomFilter;
use crate::error::PichiError;
use crate::format::layout::MAX_FILES;
use crate::format::{FormatError, IndexFormat, IndexVersion};
use crate::io::{InputStream, OutputSink, output_path, with_suffix};
use crate::pcap::PcapStream;

use parser::{FrameKind, parse_frame};
pub use writer::IndexWriter;

/// Default target false positive rate of the bloom sidecar.
pub const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// How inputs map to index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// One index holding a file section per input; `output` is a file.
    #[default]
    Combined,
    /// One index per input; `output` is a directory.
    Individual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    pub mode: IndexMode,
    pub format: IndexFormat,
    pub version: IndexVersion,
    /// Name stored in the binary header. Individual indexes default to the
    /// capture's file name.
    pub name: Option<String>,
    pub compress: bool,
    pub bloom: bool,
    pub bloom_fp_rate: f64,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            mode: IndexMode::default(),
            format: IndexFormat::default(),
            version: IndexVersion::default(),
            name: None,
            compress: false,
            bloom: false,
            bloom_fp_rate: DEFAULT_BLOOM_FP_RATE,
        }
    }
}

/// One written index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexArtifact {
    pub path: PathBuf,
    pub bloom: Option<PathBuf>,
    pub files: Vec<FileSummary>,
    pub packets: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub artifacts: Vec<IndexArtifact>,
}

/// Index `inputs` into `output` according to `options`.
///
/// A partially written index is removed when indexing fails.
///
/// # Errors
/// `PichiError::Io` when an input cannot be opened or an output written,
/// `PichiError::Pcap` for an input without a valid pcap header, and
/// `PichiError::Format` when a format limit is exceeded (header name, file
/// count, version 2 offsets).
pub fn index_pcaps(
    inputs: &[PathBuf],
    output: &Path,
    options: &IndexOptions,
) -> Result<IndexReport, PichiError> {
    if options.bloom {
        BloomFilter::validate_rate(options.bloom_fp_rate)?;
    }
    let created = creation_time();
    let mut report = IndexReport::default();
    match options.mode {
        IndexMode::Combined => {
            if inputs.len() > MAX_FILES {
                return Err(FormatError::TooManyFiles {
                    count: inputs.len(),
                }
                .into());
            }
            let name = options.name.as_deref().unwrap_or_default();
            report
                .artifacts
                .push(write_index(inputs, output, name, created, options)?);
        }
        IndexMode::Individual => {
            fs::create_dir_all(output).map_err(PichiError::io(output))?;
            let mut seen = HashSet::new();
            for input in inputs {
                let file_name = input
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| FormatError::InvalidSourceName {
                        name: input.display().to_string(),
                    })?;
                let path = output.join(format!("{file_name}.{}", options.format.extension()));
                if !seen.insert(path.clone()) {
                    return Err(PichiError::Io {
                        path,
                        source: io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            "two inputs share a file name",
                        ),
                    });
                }
                let name = options.name.as_deref().unwrap_or(file_name);
                report.artifacts.push(write_index(
                    std::slice::from_ref(input),
                    &path,
                    name,
                    created,
                    options,
                )?);
            }
        }
    }
    Ok(report)
}

fn write_index(
    inputs: &[PathBuf],
    path: &Path,
    name: &str,
    created: u32,
    options: &IndexOptions,
) -> Result<IndexArtifact, PichiError> {
    let written = output_path(path, options.compress);
    match build_index(inputs, path, &written, name, created, options) {
        Ok(artifact) => {
            info!(
                index = %artifact.path.display(),
                files = artifact.files.len(),
                packets = artifact.packets,
                "index written"
            );
            Ok(artifact)
        }
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(&written) {
                debug!(path = %written.display(), error = %remove_err, "could not remove partial index");
            }
            Err(err)
        }
    }
}

fn build_index(
    inputs: &[PathBuf],
    path: &Path,
    written: &Path,
    name: &str,
    created: u32,
    options: &IndexOptions,
) -> Result<IndexArtifact, PichiError> {
    let sink = OutputSink::create(written, options.compress).map_err(PichiError::io(written))?;
    let mut writer = IndexWriter::new(sink, options.format, options.version, name, created)?;
    let mut hosts = options.bloom.then(HashSet::new);
    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        files.push(index_pcap(input, &mut writer, hosts.as_mut())?);
    }
    let packets = writer.packets();
    writer
        .finish()?
        .finish()
        .map_err(PichiError::io(written))?;

    let bloom = match hosts {
        Some(hosts) => {
            let bloom_path = with_suffix(path, ".bloom");
            let mut bloom = BloomFilter::with_capacity(hosts.len(), options.bloom_fp_rate)?;
            bloom.update(hosts.iter().map(crate::bloom::packed));
            bloom.write_to(&bloom_path)?;
            debug!(
                path = %bloom_path.display(),
                hosts = hosts.len(),
                bits = bloom.num_bits(),
                hashes = bloom.num_hashes(),
                "bloom sidecar written"
            );
            Some(bloom_path)
        }
        None => None,
    };

    Ok(IndexArtifact {
        path: written.to_path_buf(),
        bloom,
        files,
        packets,
    })
}

/// Index one capture file into the current writer as a new file section.
///
/// The section's source name is the path exactly as given. Gzip-compressed
/// captures are decompressed on the fly.
pub fn index_pcap<W: Write>(
    path: &Path,
    writer: &mut IndexWriter<W>,
    hosts: Option<&mut HashSet<IpAddr>>,
) -> Result<FileSummary, PichiError> {
    let source = path.to_str().ok_or_else(|| FormatError::InvalidSourceName {
        name: path.display().to_string(),
    })?;
    let input = InputStream::open(path).map_err(PichiError::io(path))?;
    index_stream(source, input, writer, hosts)
}

/// Index a capture read from `input`, recorded under `source`.
pub fn index_stream<R: Read, W: Write>(
    source: &str,
    input: R,
    writer: &mut IndexWriter<W>,
    mut hosts: Option<&mut HashSet<IpAddr>>,
) -> Result<FileSummary, PichiError> {
    let path = Path::new(source);
    let mut stream = PcapStream::new(input).map_err(PichiError::pcap(path))?;
    let linktype = stream.linktype();
    if linktype != Linktype::ETHERNET {
        warn!(
            source,
            linktype = linktype.0,
            "capture is not Ethernet, rows carry zero fields"
        );
    }
    writer.begin_file(source)?;

    let mut summary = FileSummary {
        source: source.to_string(),
        packets: 0,
        bytes: 0,
    };
    let mut unknown = 0u64;
    while let Some(frame) = stream.next_frame().map_err(PichiError::pcap(path))? {
        let fields = parse_frame(frame.data, linktype);
        if fields.kind == FrameKind::Unknown {
            unknown += 1;
        }
        let record = fields.into_record(&frame);
        // Every stored address is a member, unknown frames' 0.0.0.0 included.
        if let Some(hosts) = hosts.as_deref_mut() {
            hosts.insert(record.src_host);
            hosts.insert(record.dst_host);
        }
        writer.write_record(&record)?;
        summary.packets += 1;
        summary.bytes += record.bytes();
    }
    if unknown > 0 {
        warn!(
            source,
            packets = unknown,
            "frames without an indexed EtherType stored with zero fields"
        );
    }
    debug!(source, packets = summary.packets, bytes = summary.bytes, "capture indexed");
    Ok(summary)
}

fn creation_time() -> u32 {
    u32::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}
