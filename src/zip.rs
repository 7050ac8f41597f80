//! Streaming ZIP writer that compresses archive entries on-the-fly
//!
//! Entries are written with the data descriptor flag (bit 3) so sizes and
//! CRCs land after the payload, which means the writer never seeks back.
//! That keeps the sink requirement at plain [`Write`] and the memory cost at
//! one deflate window regardless of document size.

use crate::error::{Result, SheetError};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Finished entry, remembered for the central directory
struct ZipEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
}

/// Counts every byte that reaches the sink, giving absolute archive offsets
struct CountingWriter<W: Write> {
    inner: W,
    offset: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct CurrentEntry<W: Write> {
    name: String,
    local_header_offset: u64,
    data_offset: u64,
    crc: Crc32,
    uncompressed: u64,
    encoder: DeflateEncoder<CountingWriter<W>>,
}

enum Output<W: Write> {
    Idle(CountingWriter<W>),
    Entry(CurrentEntry<W>),
    // Transient state during entry transitions
    Detached,
}

/// ZIP archive writer over any byte sink
pub(crate) struct StreamingZipWriter<W: Write> {
    output: Output<W>,
    entries: Vec<ZipEntry>,
    compression: Compression,
}

impl<W: Write> StreamingZipWriter<W> {
    pub(crate) fn new(sink: W, compression_level: u32) -> Self {
        StreamingZipWriter {
            output: Output::Idle(CountingWriter {
                inner: sink,
                offset: 0,
            }),
            entries: Vec::new(),
            compression: Compression::new(compression_level.min(9)),
        }
    }

    /// Start a new entry, finishing the previous one if any
    pub(crate) fn start_entry(&mut self, name: &str) -> Result<()> {
        self.finish_current_entry()?;

        let mut output = match std::mem::replace(&mut self.output, Output::Detached) {
            Output::Idle(output) => output,
            _ => unreachable!("entry already finished above"),
        };

        let local_header_offset = output.offset;

        // Local file header with the data descriptor flag (bit 3)
        output.write_all(&[0x50, 0x4b, 0x03, 0x04])?; // signature
        output.write_all(&[20, 0])?; // version needed
        output.write_all(&[8, 0])?; // general purpose bit flag (bit 3 set)
        output.write_all(&[8, 0])?; // compression method = deflate
        output.write_all(&[0, 0, 0, 0])?; // mod time/date
        output.write_all(&0u32.to_le_bytes())?; // crc32 placeholder
        output.write_all(&0u32.to_le_bytes())?; // compressed size placeholder
        output.write_all(&0u32.to_le_bytes())?; // uncompressed size placeholder
        output.write_all(&(name.len() as u16).to_le_bytes())?;
        output.write_all(&0u16.to_le_bytes())?; // extra len
        output.write_all(name.as_bytes())?;

        let data_offset = output.offset;
        self.output = Output::Entry(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            data_offset,
            crc: Crc32::new(),
            uncompressed: 0,
            encoder: DeflateEncoder::new(output, self.compression),
        });
        Ok(())
    }

    /// Write uncompressed data into the current entry
    pub(crate) fn write_data(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.output {
            Output::Entry(entry) => {
                entry.crc.update(data);
                entry.uncompressed += data.len() as u64;
                entry.encoder.write_all(data)?;
                Ok(())
            }
            _ => Err(SheetError::Io(io::Error::other("no archive entry started"))),
        }
    }

    fn finish_current_entry(&mut self) -> Result<()> {
        let entry = match std::mem::replace(&mut self.output, Output::Detached) {
            Output::Entry(entry) => entry,
            other => {
                self.output = other;
                return Ok(());
            }
        };

        let mut output = entry.encoder.finish()?;

        let crc = entry.crc.finalize();
        let compressed_size = (output.offset - entry.data_offset) as u32;
        let uncompressed_size = entry.uncompressed as u32;

        // Data descriptor
        output.write_all(&[0x50, 0x4b, 0x07, 0x08])?;
        output.write_all(&crc.to_le_bytes())?;
        output.write_all(&compressed_size.to_le_bytes())?;
        output.write_all(&uncompressed_size.to_le_bytes())?;

        self.entries.push(ZipEntry {
            name: entry.name,
            local_header_offset: entry.local_header_offset,
            crc32: crc,
            compressed_size,
            uncompressed_size,
        });
        self.output = Output::Idle(output);
        Ok(())
    }

    /// Write the central directory, flush, and hand the sink back
    pub(crate) fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let mut output = match self.output {
            Output::Idle(output) => output,
            _ => unreachable!("entry finished above"),
        };

        let central_dir_offset = output.offset;

        for entry in &self.entries {
            output.write_all(&[0x50, 0x4b, 0x01, 0x02])?; // central dir signature
            output.write_all(&[20, 0])?; // version made by
            output.write_all(&[20, 0])?; // version needed
            output.write_all(&[8, 0])?; // general purpose bit flag (bit 3 set)
            output.write_all(&[8, 0])?; // compression method
            output.write_all(&[0, 0, 0, 0])?; // mod time/date
            output.write_all(&entry.crc32.to_le_bytes())?;
            output.write_all(&entry.compressed_size.to_le_bytes())?;
            output.write_all(&entry.uncompressed_size.to_le_bytes())?;
            output.write_all(&(entry.name.len() as u16).to_le_bytes())?;
            output.write_all(&0u16.to_le_bytes())?; // extra len
            output.write_all(&0u16.to_le_bytes())?; // file comment len
            output.write_all(&0u16.to_le_bytes())?; // disk number start
            output.write_all(&0u16.to_le_bytes())?; // internal attrs
            output.write_all(&0u32.to_le_bytes())?; // external attrs
            output.write_all(&(entry.local_header_offset as u32).to_le_bytes())?;
            output.write_all(entry.name.as_bytes())?;
        }

        let central_dir_size = output.offset - central_dir_offset;

        // End of central directory
        output.write_all(&[0x50, 0x4b, 0x05, 0x06])?;
        output.write_all(&0u16.to_le_bytes())?; // disk number
        output.write_all(&0u16.to_le_bytes())?; // disk with central dir
        output.write_all(&(self.entries.len() as u16).to_le_bytes())?;
        output.write_all(&(self.entries.len() as u16).to_le_bytes())?;
        output.write_all(&(central_dir_size as u32).to_le_bytes())?;
        output.write_all(&(central_dir_offset as u32).to_le_bytes())?;
        output.write_all(&0u16.to_le_bytes())?; // comment len

        output.flush()?;
        Ok(output.inner)
    }
}

/// Lets the spreadsheet buffer flush straight into the active entry
impl<W: Write> Write for StreamingZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)
            .map_err(|e| match e {
                SheetError::Io(e) => e,
                other => io::Error::other(other.to_string()),
            })
            .map(|_| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_structure() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        zip.start_entry("hello.txt").unwrap();
        zip.write_data(b"hello world").unwrap();
        zip.start_entry("dir/other.txt").unwrap();
        zip.write_data(b"more data").unwrap();
        let bytes = zip.finish().unwrap();

        // Local header signatures at the start, end-of-central-directory at the end
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x03, 0x04]);
        let eocd = bytes.len() - 22;
        assert_eq!(&bytes[eocd..eocd + 4], &[0x50, 0x4b, 0x05, 0x06]);
        assert_eq!(&bytes[eocd + 8..eocd + 10], &2u16.to_le_bytes());
    }

    #[test]
    fn test_write_without_entry_fails() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        assert!(zip.write_data(b"data").is_err());
    }
}
