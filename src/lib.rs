//! # sheetstream
//!
//! A forward-only streaming XLSX writer for Rust.
//!
//! ## Features
//!
//! - **Streaming Write**: Write millions of rows with constant memory usage
//! - **Typed Cells**: Strings, integers, floats, booleans, date-times
//! - **Formula Support**: Formula cells with cached result values
//! - **Styling**: Deduplicated fonts, fills, borders, alignments and number formats
//! - **Worksheet Extras**: Merged cells, data validations, notes, embedded images
//! - **Any Sink**: Writes to anything implementing `std::io::Write`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetstream::{Cell, Workbook, WorksheetOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut book = Workbook::create("output.xlsx")?;
//!
//! let mut sheet = book.start_worksheet("Sheet1", WorksheetOptions::default())?;
//! sheet.add_row(&[Cell::new("Name"), Cell::new("Age"), Cell::new("Score")])?;
//! sheet.add_row(&[Cell::new("Alice"), Cell::new(30i64), Cell::new(91.5)])?;
//! sheet.add_row(&[
//!     Cell::new("Total"),
//!     Cell::new(1i64),
//!     Cell::formula("SUM(C2:C2)", 91.5),
//! ])?;
//! drop(sheet);
//!
//! book.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Styled Cells
//!
//! ```rust,no_run
//! use sheetstream::{Cell, Font, Style, Workbook, WorksheetOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut book = Workbook::create("styled.xlsx")?;
//!
//! let header = book.add_style(&Style {
//!     font: Font { bold: true, ..Default::default() },
//!     ..Default::default()
//! });
//!
//! let mut sheet = book.start_worksheet("Report", WorksheetOptions::default())?;
//! sheet.add_row(&[Cell::styled("Revenue", header), Cell::styled("Cost", header)])?;
//! sheet.add_row(&[Cell::new(1250.0), Cell::new(470.0)])?;
//! drop(sheet);
//!
//! book.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cellref;
mod cellwriter;
pub mod error;
mod images;
mod metadata;
mod notes;
pub mod styles;
pub mod types;
pub mod validation;
mod workbook;
mod worksheet;
mod zip;

pub use buffer::CancelToken;
pub use error::{Result, SheetError};
pub use images::{EmbeddedImage, ImageCanvas};
pub use notes::MAX_NOTE_TEXT_LENGTH;
pub use styles::{
    Alignment, Border, BorderStyle, Color, Fill, Font, HorizontalAlignment, NumberFormat,
    StandardNumberFormat, Style, StyleId, StyleNameVisibility, VerticalAlignment,
};
pub use types::{Cell, CellValue, RowOptions, SheetVisibility, WorksheetOptions};
pub use validation::{DataValidation, MAX_DATA_VALIDATIONS};
pub use workbook::{SheetWriter, Workbook, WorkbookOptions};

/// Minimal reader for archives produced by this crate, used by unit tests
/// to check what was actually written.
#[cfg(test)]
pub(crate) mod test_support {
    use flate2::read::DeflateDecoder;
    use std::collections::HashMap;
    use std::io::Read;

    /// Parse the central directory and inflate every entry
    pub fn read_archive_bytes(bytes: &[u8]) -> HashMap<String, Vec<u8>> {
        let eocd = bytes.len() - 22;
        assert_eq!(&bytes[eocd..eocd + 4], &[0x50, 0x4b, 0x05, 0x06]);
        let entry_count = u16::from_le_bytes([bytes[eocd + 10], bytes[eocd + 11]]) as usize;
        let mut offset = u32::from_le_bytes([
            bytes[eocd + 16],
            bytes[eocd + 17],
            bytes[eocd + 18],
            bytes[eocd + 19],
        ]) as usize;

        let mut entries = HashMap::new();
        for _ in 0..entry_count {
            assert_eq!(&bytes[offset..offset + 4], &[0x50, 0x4b, 0x01, 0x02]);
            let le_u32 = |at: usize| {
                u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
            };
            let le_u16 = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);

            let compressed_size = le_u32(offset + 20) as usize;
            let name_len = le_u16(offset + 28) as usize;
            let extra_len = le_u16(offset + 30) as usize;
            let comment_len = le_u16(offset + 32) as usize;
            let local_offset = le_u32(offset + 42) as usize;
            let name =
                String::from_utf8(bytes[offset + 46..offset + 46 + name_len].to_vec()).unwrap();

            let local_name_len = le_u16(local_offset + 26) as usize;
            let local_extra_len = le_u16(local_offset + 28) as usize;
            let data_start = local_offset + 30 + local_name_len + local_extra_len;
            let compressed = &bytes[data_start..data_start + compressed_size];

            let mut inflated = Vec::new();
            DeflateDecoder::new(compressed)
                .read_to_end(&mut inflated)
                .unwrap();
            entries.insert(name, inflated);

            offset += 46 + name_len + extra_len + comment_len;
        }
        entries
    }

    /// Like [`read_archive_bytes`], with entries decoded as UTF-8
    pub fn read_archive(bytes: &[u8]) -> HashMap<String, String> {
        read_archive_bytes(bytes)
            .into_iter()
            .map(|(name, data)| (name, String::from_utf8(data).unwrap()))
            .collect()
    }
}
