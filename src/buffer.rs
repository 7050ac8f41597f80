//! Reusable write buffer with explicit flush points
//!
//! All XML generation goes through one fixed-capacity buffer per workbook.
//! Writers commit bytes with [`SpreadsheetBuffer::advance`] and flush to the
//! archive entry when the remaining capacity runs out. Flushing is the only
//! point where the underlying sink is touched, and the only point where
//! cancellation is observed.

use crate::error::{Result, SheetError};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Smallest allowed buffer size. Chosen so that every bounded cell fragment
/// (a styled numeric cell is the largest) fits in an empty buffer.
pub const MIN_BUFFER_SIZE: usize = 512;

/// Default buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Cooperative cancellation signal, checked at every buffer flush.
///
/// Cancelling aborts the in-flight write with [`SheetError::Cancelled`] and
/// leaves the output in a partially-written, unusable state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from another thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Fixed-capacity byte buffer with a cursor, reused for a whole workbook
pub(crate) struct SpreadsheetBuffer {
    data: Vec<u8>,
    index: usize,
    cancel: Option<CancelToken>,
}

impl SpreadsheetBuffer {
    pub(crate) fn new(size: usize, cancel: Option<CancelToken>) -> Result<Self> {
        if size < MIN_BUFFER_SIZE {
            return Err(SheetError::BufferTooSmall {
                size,
                min: MIN_BUFFER_SIZE,
            });
        }
        Ok(SpreadsheetBuffer {
            data: vec![0; size],
            index: 0,
            cancel,
        })
    }

    pub(crate) fn free_capacity(&self) -> usize {
        self.data.len() - self.index
    }

    /// The unwritten tail of the backing array
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        &mut self.data[self.index..]
    }

    /// Commit `n` bytes previously written into [`spare`](Self::spare)
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.index + n <= self.data.len());
        self.index += n;
    }

    /// Copy `bytes` if they fit in the free capacity
    pub(crate) fn try_write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free_capacity() {
            return false;
        }
        self.data[self.index..self.index + bytes.len()].copy_from_slice(bytes);
        self.index += bytes.len();
        true
    }

    /// Write all committed bytes to `sink` and reset the cursor.
    ///
    /// This is the suspension point of the whole crate: the cancellation
    /// token is checked here and IO errors from the sink propagate as-is.
    pub(crate) fn flush_to<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(SheetError::Cancelled);
            }
        }
        if self.index > 0 {
            sink.write_all(&self.data[..self.index])?;
            self.index = 0;
        }
        Ok(())
    }

    /// Write a payload of arbitrary length, flushing whenever the buffer
    /// fills up. Used for metadata documents where no fast path is needed.
    pub(crate) fn write_all_chunked<W: Write>(&mut self, bytes: &[u8], sink: &mut W) -> Result<()> {
        let mut pos = 0;
        while pos < bytes.len() {
            if self.free_capacity() == 0 {
                self.flush_to(sink)?;
            }
            let n = self.free_capacity().min(bytes.len() - pos);
            self.data[self.index..self.index + n].copy_from_slice(&bytes[pos..pos + n]);
            self.index += n;
            pos += n;
        }
        Ok(())
    }

    /// Piece-by-piece writer for unbounded string payloads.
    ///
    /// XML-escapes `text` starting from byte position `*pos`, copies as many
    /// whole characters as fit, and advances `*pos` past them. Returns true
    /// once the string is exhausted; on false the caller must flush and call
    /// again. A character's escaped form is never split across flushes.
    pub(crate) fn write_long_string(&mut self, text: &str, pos: &mut usize) -> bool {
        for c in text[*pos..].chars() {
            let mut utf8 = [0u8; 4];
            let encoded: &[u8] = match c {
                '&' => b"&amp;",
                '<' => b"&lt;",
                '>' => b"&gt;",
                '"' => b"&quot;",
                '\'' => b"&apos;",
                _ => c.encode_utf8(&mut utf8).as_bytes(),
            };
            if !self.try_write(encoded) {
                return false;
            }
            *pos += c.len_utf8();
        }
        true
    }
}
