//! Worksheet body emission and per-sheet state
//!
//! A worksheet moves through Open (header written), N rows, Closed (footer
//! written, entry flushed). Row indices are implicit and strictly
//! sequential from 1. Merged ranges, data validations, notes and image
//! placements accumulate on the side and are serialized at close: the first
//! two into the worksheet body after `</sheetData>`, the latter two into
//! auxiliary parts written by the workbook.

use crate::buffer::SpreadsheetBuffer;
use crate::cellref::CellRange;
use crate::cellwriter::{
    resolve_style_index, try_write_cell, write_cell, CellPosition,
};
use crate::error::Result;
use crate::images::WorksheetImage;
use crate::notes::Note;
use crate::styles::StyleId;
use crate::types::{Cell, RowOptions, WorksheetOptions};
use crate::validation::{push_data_validations_xml, DataValidation};
use crate::zip::StreamingZipWriter;
use std::io::Write;

/// Where row emission stopped when the fast path ran out of buffer space
#[derive(Debug, Clone, Copy, Default)]
struct RowPending {
    next_cell: usize,
    header_written: bool,
}

/// Mutable state of the one active worksheet
pub(crate) struct ActiveSheet {
    next_row: u32,
    pending: Option<RowPending>,
    pub(crate) merges: Vec<CellRange>,
    pub(crate) validations: Vec<(CellRange, DataValidation)>,
    pub(crate) notes: Vec<Note>,
    pub(crate) images: Vec<WorksheetImage>,
}

impl ActiveSheet {
    pub(crate) fn new() -> Self {
        ActiveSheet {
            next_row: 1,
            pending: None,
            merges: Vec::new(),
            validations: Vec::new(),
            notes: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Row number the next added row will get
    pub(crate) fn next_row_number(&self) -> u32 {
        self.next_row
    }
}

/// Write the worksheet header: XML declaration, root element, optional
/// column widths, and the opening `<sheetData>`
pub(crate) fn write_sheet_head<W: Write>(
    options: &WorksheetOptions,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut out = Vec::with_capacity(512);
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
          xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    );

    if !options.column_widths.is_empty() {
        let mut num = itoa::Buffer::new();
        let mut float = ryu::Buffer::new();
        out.extend_from_slice(b"<cols>");
        for (column, width) in &options.column_widths {
            out.extend_from_slice(b"<col min=\"");
            out.extend_from_slice(num.format(*column).as_bytes());
            out.extend_from_slice(b"\" max=\"");
            out.extend_from_slice(num.format(*column).as_bytes());
            out.extend_from_slice(b"\" width=\"");
            out.extend_from_slice(float.format(*width).as_bytes());
            out.extend_from_slice(b"\" customWidth=\"1\"/>");
        }
        out.extend_from_slice(b"</cols>");
    }

    out.extend_from_slice(b"<sheetData>");
    buffer.write_all_chunked(&out, zip)
}

/// Write the worksheet footer: closing `sheetData`, merged ranges, data
/// validations and drawing references, then flush the entry.
pub(crate) fn write_sheet_foot<W: Write>(
    sheet: &ActiveSheet,
    has_images: bool,
    has_notes: bool,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut out = Vec::with_capacity(512);
    out.extend_from_slice(b"</sheetData>");

    if !sheet.merges.is_empty() {
        let mut num = itoa::Buffer::new();
        out.extend_from_slice(b"<mergeCells count=\"");
        out.extend_from_slice(num.format(sheet.merges.len()).as_bytes());
        out.extend_from_slice(b"\">");
        for merge in &sheet.merges {
            out.extend_from_slice(b"<mergeCell ref=\"");
            merge.push_to(&mut out);
            out.extend_from_slice(b"\"/>");
        }
        out.extend_from_slice(b"</mergeCells>");
    }

    push_data_validations_xml(&mut out, &sheet.validations);

    // Relationship ids line up with the worksheet rels part: the drawing is
    // rId1 when present, the legacy drawing for notes comes right after.
    if has_images {
        out.extend_from_slice(b"<drawing r:id=\"rId1\"/>");
    }
    if has_notes {
        out.extend_from_slice(if has_images {
            b"<legacyDrawing r:id=\"rId2\"/>"
        } else {
            b"<legacyDrawing r:id=\"rId1\"/>"
        });
    }

    out.extend_from_slice(b"</worksheet>");
    buffer.write_all_chunked(&out, zip)?;
    buffer.flush_to(zip)
}

fn try_write_row_start(
    buffer: &mut SpreadsheetBuffer,
    row: u32,
    options: Option<&RowOptions>,
) -> bool {
    let bytes = buffer.spare();
    let mut w = 0;
    let mut num = itoa::Buffer::new();

    let mut ok = try_push(bytes, &mut w, b"<row r=\"")
        && try_push(bytes, &mut w, num.format(row).as_bytes())
        && try_push(bytes, &mut w, b"\"");

    if let Some(options) = options {
        if let Some(height) = options.height {
            let mut float = ryu::Buffer::new();
            ok = ok
                && try_push(bytes, &mut w, b" ht=\"")
                && try_push(bytes, &mut w, float.format(height).as_bytes())
                && try_push(bytes, &mut w, b"\" customHeight=\"1\"");
        }
        if options.hidden {
            ok = ok && try_push(bytes, &mut w, b" hidden=\"1\"");
        }
    }

    ok = ok && try_push(bytes, &mut w, b">");
    if ok {
        buffer.advance(w);
    }
    ok
}

fn try_push(bytes: &mut [u8], written: &mut usize, data: &[u8]) -> bool {
    if *written + data.len() > bytes.len() {
        return false;
    }
    bytes[*written..*written + data.len()].copy_from_slice(data);
    *written += data.len();
    true
}

fn cell_position(write_refs: bool, row: u32, cell_index: usize) -> Option<CellPosition> {
    write_refs.then(|| CellPosition {
        row,
        column: cell_index as u32 + 1,
    })
}

/// Fast path: encode the whole row without flushing.
///
/// On false the row is partially committed and the sheet remembers where it
/// stopped; the caller completes it by calling [`add_row`] with the same
/// cells.
pub(crate) fn try_add_row(
    sheet: &mut ActiveSheet,
    buffer: &mut SpreadsheetBuffer,
    cells: &[Cell],
    options: Option<&RowOptions>,
    write_refs: bool,
    default_date_time: Option<StyleId>,
) -> bool {
    let mut pending = sheet.pending.take().unwrap_or_default();

    if !pending.header_written {
        if !try_write_row_start(buffer, sheet.next_row, options) {
            sheet.pending = Some(pending);
            return false;
        }
        pending.header_written = true;
    }

    while pending.next_cell < cells.len() {
        let cell = &cells[pending.next_cell];
        let style = resolve_style_index(cell, default_date_time);
        let position = cell_position(write_refs, sheet.next_row, pending.next_cell);
        if !try_write_cell(buffer, cell, style, position) {
            sheet.pending = Some(pending);
            return false;
        }
        pending.next_cell += 1;
    }

    if !buffer.try_write(b"</row>") {
        sheet.pending = Some(pending);
        return false;
    }

    sheet.next_row += 1;
    true
}

/// Guaranteed path: complete the row, flushing as many times as needed.
/// Picks up where a failed [`try_add_row`] stopped.
pub(crate) fn add_row<W: Write>(
    sheet: &mut ActiveSheet,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
    cells: &[Cell],
    options: Option<&RowOptions>,
    write_refs: bool,
    default_date_time: Option<StyleId>,
) -> Result<()> {
    let pending = sheet.pending.take().unwrap_or_default();

    if !pending.header_written && !try_write_row_start(buffer, sheet.next_row, options) {
        buffer.flush_to(zip)?;
        let fitted = try_write_row_start(buffer, sheet.next_row, options);
        debug_assert!(fitted, "row start exceeds the minimum buffer size");
    }

    for index in pending.next_cell..cells.len() {
        let cell = &cells[index];
        let style = resolve_style_index(cell, default_date_time);
        let position = cell_position(write_refs, sheet.next_row, index);
        write_cell(buffer, zip, cell, style, position)?;
    }

    if !buffer.try_write(b"</row>") {
        buffer.flush_to(zip)?;
        let fitted = buffer.try_write(b"</row>");
        debug_assert!(fitted, "row end exceeds the minimum buffer size");
    }

    sheet.next_row += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MIN_BUFFER_SIZE;

    fn flush_to_string(buffer: &mut SpreadsheetBuffer) -> String {
        let mut sink = Vec::new();
        buffer.flush_to(&mut sink).unwrap();
        String::from_utf8(sink).unwrap()
    }

    #[test]
    fn test_row_numbers_increase_from_one() {
        let mut sheet = ActiveSheet::new();
        let mut buffer = SpreadsheetBuffer::new(MIN_BUFFER_SIZE, None).unwrap();

        assert!(try_add_row(&mut sheet, &mut buffer, &[Cell::new(1i64)], None, false, None));
        assert!(try_add_row(&mut sheet, &mut buffer, &[Cell::new(2i64)], None, false, None));
        assert_eq!(sheet.next_row_number(), 3);

        let xml = flush_to_string(&mut buffer);
        assert_eq!(
            xml,
            "<row r=\"1\"><c><v>1</v></c></row><row r=\"2\"><c><v>2</v></c></row>"
        );
    }

    #[test]
    fn test_row_options_change_opening_tag() {
        let mut sheet = ActiveSheet::new();
        let mut buffer = SpreadsheetBuffer::new(MIN_BUFFER_SIZE, None).unwrap();

        let options = RowOptions {
            height: Some(24.5),
            hidden: true,
        };
        assert!(try_add_row(
            &mut sheet,
            &mut buffer,
            &[Cell::new("x")],
            Some(&options),
            false,
            None
        ));

        let xml = flush_to_string(&mut buffer);
        assert!(xml.starts_with("<row r=\"1\" ht=\"24.5\" customHeight=\"1\" hidden=\"1\">"));
    }

    #[test]
    fn test_failed_fast_path_resumes_in_add_row() {
        let mut sheet = ActiveSheet::new();
        let mut buffer = SpreadsheetBuffer::new(MIN_BUFFER_SIZE, None).unwrap();
        let mut zip = StreamingZipWriter::new(Vec::new(), 0);
        zip.start_entry("sheet.xml").unwrap();

        let long = "y".repeat(MIN_BUFFER_SIZE * 2);
        let cells = vec![Cell::new("first"), Cell::new(long.clone())];

        assert!(!try_add_row(&mut sheet, &mut buffer, &cells, None, false, None));
        // Row number not consumed by the failed attempt
        assert_eq!(sheet.next_row_number(), 1);

        add_row(&mut sheet, &mut buffer, &mut zip, &cells, None, false, None).unwrap();
        assert_eq!(sheet.next_row_number(), 2);
        buffer.flush_to(&mut zip).unwrap();

        let bytes = zip.finish().unwrap();
        let entries = crate::test_support::read_archive(&bytes);
        let xml = &entries["sheet.xml"];
        assert!(xml.starts_with("<row r=\"1\"><c t=\"inlineStr\"><is><t>first</t></is></c>"));
        assert!(xml.contains(&long));
        assert!(xml.ends_with("</row>"));
        // The first cell must not have been written twice
        assert_eq!(xml.matches("first").count(), 1);
    }

    #[test]
    fn test_footer_collections() {
        let mut sheet = ActiveSheet::new();
        sheet.merges.push(CellRange::parse("A1:B2").unwrap());
        sheet
            .validations
            .push((CellRange::parse("C1").unwrap(), DataValidation::integer_between(0, 9)));

        let mut buffer = SpreadsheetBuffer::new(MIN_BUFFER_SIZE, None).unwrap();
        let mut zip = StreamingZipWriter::new(Vec::new(), 0);
        zip.start_entry("sheet.xml").unwrap();
        write_sheet_foot(&sheet, false, true, &mut buffer, &mut zip).unwrap();

        let bytes = zip.finish().unwrap();
        let entries = crate::test_support::read_archive(&bytes);
        let xml = &entries["sheet.xml"];
        assert!(xml.contains("<mergeCells count=\"1\"><mergeCell ref=\"A1:B2\"/></mergeCells>"));
        assert!(xml.contains("<dataValidations count=\"1\">"));
        assert!(xml.contains("<legacyDrawing r:id=\"rId1\"/>"));
        assert!(xml.ends_with("</worksheet>"));
    }
}
