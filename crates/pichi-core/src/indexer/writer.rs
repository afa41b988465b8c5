use std::io::Write;

use crate::format::layout::{
    FILE_SEPARATOR, FOOTER_SEPARATOR, HEADER_FIXED_LEN, INDEX_MAGIC, MAX_FILES, MAX_HEADER_LEN,
    MAX_SOURCE_NAME_LEN, TEXT_DELIMITER,
};
use crate::format::{FormatError, IndexFormat, IndexVersion, Record};

/// Sink for index rows, binary or text.
///
/// Call `begin_file` before the rows of each source pcap and `finish` once
/// at the end; `finish` writes the footer of a binary index.
pub enum IndexWriter<W: Write> {
    Binary(BinaryIndexWriter<W>),
    Text(TextIndexWriter<W>),
}

impl<W: Write> IndexWriter<W> {
    pub fn new(
        out: W,
        format: IndexFormat,
        version: IndexVersion,
        name: &str,
        created: u32,
    ) -> Result<Self, FormatError> {
        Ok(match format {
            IndexFormat::Binary => {
                IndexWriter::Binary(BinaryIndexWriter::new(out, version, name, created)?)
            }
            IndexFormat::Text => IndexWriter::Text(TextIndexWriter::new(out)),
        })
    }

    pub fn begin_file(&mut self, source: &str) -> Result<(), FormatError> {
        match self {
            IndexWriter::Binary(writer) => writer.begin_file(source),
            IndexWriter::Text(writer) => writer.begin_file(source),
        }
    }

    pub fn write_record(&mut self, record: &Record) -> Result<(), FormatError> {
        match self {
            IndexWriter::Binary(writer) => writer.write_record(record),
            IndexWriter::Text(writer) => writer.write_record(record),
        }
    }

    pub fn files(&self) -> usize {
        match self {
            IndexWriter::Binary(writer) => writer.files,
            IndexWriter::Text(writer) => writer.files,
        }
    }

    pub fn packets(&self) -> u64 {
        match self {
            IndexWriter::Binary(writer) => writer.packets,
            IndexWriter::Text(writer) => writer.packets,
        }
    }

    pub fn finish(self) -> Result<W, FormatError> {
        match self {
            IndexWriter::Binary(writer) => writer.finish(),
            IndexWriter::Text(writer) => writer.finish(),
        }
    }
}

pub struct BinaryIndexWriter<W> {
    out: W,
    version: IndexVersion,
    files: usize,
    packets: u64,
    row: Vec<u8>,
}

impl<W: Write> BinaryIndexWriter<W> {
    /// Write the index header.
    ///
    /// # Errors
    /// `HeaderTooLong` when the name does not fit the one-byte header length.
    pub fn new(
        mut out: W,
        version: IndexVersion,
        name: &str,
        created: u32,
    ) -> Result<Self, FormatError> {
        let header_len = HEADER_FIXED_LEN + name.len();
        if header_len > MAX_HEADER_LEN {
            return Err(FormatError::HeaderTooLong { length: header_len });
        }
        let mut header = Vec::with_capacity(header_len);
        header.extend_from_slice(&INDEX_MAGIC);
        header.push(version.as_byte());
        header.push(header_len as u8);
        header.extend_from_slice(&created.to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        out.write_all(&header)?;
        Ok(Self {
            out,
            version,
            files: 0,
            packets: 0,
            row: Vec::new(),
        })
    }

    pub fn begin_file(&mut self, source: &str) -> Result<(), FormatError> {
        if self.files >= MAX_FILES {
            return Err(FormatError::TooManyFiles {
                count: self.files + 1,
            });
        }
        if source.len() > MAX_SOURCE_NAME_LEN {
            return Err(FormatError::NameTooLong {
                length: source.len(),
            });
        }
        self.out.write_all(&FILE_SEPARATOR)?;
        self.out.write_all(&[source.len() as u8])?;
        self.out.write_all(source.as_bytes())?;
        self.files += 1;
        Ok(())
    }

    pub fn write_record(&mut self, record: &Record) -> Result<(), FormatError> {
        self.row.clear();
        record.encode_into(self.version, &mut self.row)?;
        self.out.write_all(&self.row)?;
        self.packets += 1;
        Ok(())
    }

    /// Write the footer and hand back the sink.
    pub fn finish(mut self) -> Result<W, FormatError> {
        let packets = u32::try_from(self.packets).map_err(|_| FormatError::TooManyPackets {
            count: self.packets,
        })?;
        self.out.write_all(&FOOTER_SEPARATOR)?;
        self.out.write_all(&[self.files as u8])?;
        self.out.write_all(&packets.to_le_bytes())?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Text rows carry their source name, so there is no header or footer.
pub struct TextIndexWriter<W> {
    out: W,
    source: String,
    files: usize,
    packets: u64,
}

impl<W: Write> TextIndexWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            source: String::new(),
            files: 0,
            packets: 0,
        }
    }

    pub fn begin_file(&mut self, source: &str) -> Result<(), FormatError> {
        if source.is_empty() || source.contains([TEXT_DELIMITER, '\n', '\r']) {
            return Err(FormatError::InvalidSourceName {
                name: source.to_string(),
            });
        }
        self.source = source.to_string();
        self.files += 1;
        Ok(())
    }

    pub fn write_record(&mut self, record: &Record) -> Result<(), FormatError> {
        writeln!(self.out, "{}", record.to_text_line(&self.source))?;
        self.packets += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, FormatError> {
        self.out.flush()?;
        Ok(self.out)
    }
}
