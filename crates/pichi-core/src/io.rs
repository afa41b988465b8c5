//! File access with gzip transparency.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::pcap::layout::GZIP_MAGIC;

/// A readable input that is either a plain file, a gzip stream, or bytes
/// already loaded into memory.
pub enum InputStream {
    Plain(BufReader<File>),
    Gzip(GzDecoder<BufReader<File>>),
    Memory(Cursor<Vec<u8>>),
}

impl InputStream {
    /// Open `path`, decompressing on the fly when it starts with the gzip magic.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
            Ok(InputStream::Gzip(GzDecoder::new(reader)))
        } else {
            Ok(InputStream::Plain(reader))
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, InputStream::Gzip(_))
    }

    /// Read the remaining (decompressed) bytes into memory.
    pub fn into_memory(self) -> io::Result<Self> {
        match self {
            InputStream::Memory(cursor) => Ok(InputStream::Memory(cursor)),
            mut other => {
                let mut bytes = Vec::new();
                other.read_to_end(&mut bytes)?;
                Ok(InputStream::Memory(Cursor::new(bytes)))
            }
        }
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputStream::Plain(reader) => reader.read(buf),
            InputStream::Gzip(reader) => reader.read(buf),
            InputStream::Memory(reader) => reader.read(buf),
        }
    }
}

/// A writable output, optionally gzip-compressed.
pub enum OutputSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputSink {
    pub fn create(path: &Path, compress: bool) -> io::Result<Self> {
        let writer = BufWriter::new(File::create(path)?);
        if compress {
            Ok(OutputSink::Gzip(GzEncoder::new(writer, Compression::default())))
        } else {
            Ok(OutputSink::Plain(writer))
        }
    }

    /// Flush everything, writing the gzip trailer when compressing.
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputSink::Plain(mut writer) => writer.flush(),
            OutputSink::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Plain(writer) => writer.write(buf),
            OutputSink::Gzip(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Plain(writer) => writer.flush(),
            OutputSink::Gzip(writer) => writer.flush(),
        }
    }
}

/// `path` with `suffix` appended to the full file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Output path actually written: `.gz` is appended when compressing, unless
/// the path already carries it.
pub fn output_path(path: &Path, compress: bool) -> PathBuf {
    if compress && path.extension().is_none_or(|ext| ext != "gz") {
        with_suffix(path, ".gz")
    } else {
        path.to_path_buf()
    }
}
