//! Per-value-kind cell encoders
//!
//! Every cell is emitted as byte-exact markup composed directly into the
//! spreadsheet buffer's writable span. The fast path encodes a whole cell at
//! once and reports failure without committing anything; the chunked path
//! splits unbounded string payloads across buffer flushes. Fixed-format
//! fragments are bounded well below the minimum buffer size, so a single
//! flush always makes room for them.

use crate::buffer::SpreadsheetBuffer;
use crate::cellref::push_column_letters;
use crate::error::Result;
use crate::styles::StyleId;
use crate::types::{Cell, CellValue};
use crate::zip::StreamingZipWriter;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::io::Write;

/// Position of the cell being written, used for the optional `r` attribute
#[derive(Clone, Copy)]
pub(crate) struct CellPosition {
    pub row: u32,
    pub column: u32,
}

/// Resolve the style table index a cell's markup should reference.
///
/// Date-time cells substitute the variant of their style that carries the
/// workbook's default date-time format, falling back to the dedicated
/// default date-time style when the cell is unstyled.
pub(crate) fn resolve_style_index(cell: &Cell, default_date_time: Option<StyleId>) -> Option<u32> {
    let is_date_time = matches!(cell.value, CellValue::DateTime(_));
    let index = match (cell.style, is_date_time) {
        (Some(id), true) => Some(id.date_time_index),
        (Some(id), false) => Some(id.index),
        (None, true) => default_date_time.map(|id| id.date_time_index),
        (None, false) => None,
    };
    // Index 0 is the implicit default, no attribute needed
    index.filter(|&index| index > 0)
}

/// Excel serial date: days since 1899-12-30, time as a fraction of a day
pub(crate) fn date_time_serial(date_time: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    let days = (date_time.date() - epoch.date()).num_days() as f64;
    let seconds = f64::from(date_time.num_seconds_from_midnight());
    days + seconds / 86_400.0
}

fn try_push(bytes: &mut [u8], written: &mut usize, data: &[u8]) -> bool {
    if *written + data.len() > bytes.len() {
        return false;
    }
    bytes[*written..*written + data.len()].copy_from_slice(data);
    *written += data.len();
    true
}

fn try_push_u32(bytes: &mut [u8], written: &mut usize, value: u32) -> bool {
    let mut num = itoa::Buffer::new();
    try_push(bytes, written, num.format(value).as_bytes())
}

fn try_push_i64(bytes: &mut [u8], written: &mut usize, value: i64) -> bool {
    let mut num = itoa::Buffer::new();
    try_push(bytes, written, num.format(value).as_bytes())
}

fn try_push_f64(bytes: &mut [u8], written: &mut usize, value: f64) -> bool {
    if value.is_finite() {
        let mut num = ryu::Buffer::new();
        try_push(bytes, written, num.format_finite(value).as_bytes())
    } else if value.is_nan() {
        try_push(bytes, written, b"NaN")
    } else if value > 0.0 {
        try_push(bytes, written, b"Infinity")
    } else {
        try_push(bytes, written, b"-Infinity")
    }
}

/// Escape `text` into the span, whole-string-or-nothing
fn try_push_escaped(bytes: &mut [u8], written: &mut usize, text: &str) -> bool {
    let mut w = *written;
    for c in text.chars() {
        let mut utf8 = [0u8; 4];
        let encoded: &[u8] = match c {
            '&' => b"&amp;",
            '<' => b"&lt;",
            '>' => b"&gt;",
            '"' => b"&quot;",
            '\'' => b"&apos;",
            _ => c.encode_utf8(&mut utf8).as_bytes(),
        };
        if !try_push(bytes, &mut w, encoded) {
            return false;
        }
    }
    *written = w;
    true
}

/// Write the `<c ...` start tag up to and including the payload opener.
///
/// For an empty, formula-less cell this closes the element outright. Bounded
/// by construction, so it always fits in a freshly flushed buffer.
fn try_write_start(
    bytes: &mut [u8],
    written: &mut usize,
    cell: &Cell,
    style_index: Option<u32>,
    position: Option<CellPosition>,
) -> bool {
    let mut w = *written;

    if !try_push(bytes, &mut w, b"<c") {
        return false;
    }
    if let Some(position) = position {
        if !try_push(bytes, &mut w, b" r=\"") {
            return false;
        }
        let mut reference = Vec::with_capacity(12);
        push_column_letters(&mut reference, position.column);
        if !try_push(bytes, &mut w, &reference)
            || !try_push_u32(bytes, &mut w, position.row)
            || !try_push(bytes, &mut w, b"\"")
        {
            return false;
        }
    }

    let type_attr: &[u8] = match (&cell.value, cell.formula.is_some()) {
        (CellValue::String(_), false) => b" t=\"inlineStr\"",
        (CellValue::String(_), true) => b" t=\"str\"",
        (CellValue::Bool(_), _) => b" t=\"b\"",
        _ => b"",
    };
    if !try_push(bytes, &mut w, type_attr) {
        return false;
    }

    if let Some(style_index) = style_index {
        if !try_push(bytes, &mut w, b" s=\"")
            || !try_push_u32(bytes, &mut w, style_index)
            || !try_push(bytes, &mut w, b"\"")
        {
            return false;
        }
    }

    let opener: &[u8] = if cell.formula.is_some() {
        b"><f>"
    } else {
        match &cell.value {
            CellValue::Empty => b"/>",
            CellValue::String(_) => b"><is><t>",
            _ => b"><v>",
        }
    };
    if !try_push(bytes, &mut w, opener) {
        return false;
    }

    *written = w;
    true
}

/// Write the bounded payload of a non-string value
fn try_write_bounded_value(bytes: &mut [u8], written: &mut usize, value: &CellValue) -> bool {
    match value {
        CellValue::Int(value) => try_push_i64(bytes, written, *value),
        CellValue::Float(value) => try_push_f64(bytes, written, *value),
        CellValue::Bool(value) => try_push(bytes, written, if *value { b"1" } else { b"0" }),
        CellValue::DateTime(value) => try_push_f64(bytes, written, date_time_serial(value)),
        CellValue::Empty | CellValue::String(_) => true,
    }
}

/// Close tag for a formula-less cell
fn end_tag(value: &CellValue) -> &'static [u8] {
    match value {
        CellValue::Empty => b"",
        CellValue::String(_) => b"</t></is></c>",
        _ => b"</v></c>",
    }
}

/// Whether the chunked path has to split this cell's payload
pub(crate) fn can_write_piece_by_piece(cell: &Cell) -> bool {
    cell.formula.is_some() || matches!(cell.value, CellValue::String(_))
}

/// Fast path: encode the whole cell or commit nothing
pub(crate) fn try_write_cell(
    buffer: &mut SpreadsheetBuffer,
    cell: &Cell,
    style_index: Option<u32>,
    position: Option<CellPosition>,
) -> bool {
    let bytes = buffer.spare();
    let mut w = 0;

    if !try_write_start(bytes, &mut w, cell, style_index, position) {
        return false;
    }

    let done = if let Some(formula) = &cell.formula {
        try_push_escaped(bytes, &mut w, formula)
            && match &cell.value {
                CellValue::Empty => try_push(bytes, &mut w, b"</f></c>"),
                CellValue::String(text) => {
                    try_push(bytes, &mut w, b"</f><v>")
                        && try_push_escaped(bytes, &mut w, text)
                        && try_push(bytes, &mut w, b"</v></c>")
                }
                value => {
                    try_push(bytes, &mut w, b"</f><v>")
                        && try_write_bounded_value(bytes, &mut w, value)
                        && try_push(bytes, &mut w, b"</v></c>")
                }
            }
    } else {
        match &cell.value {
            CellValue::Empty => true,
            CellValue::String(text) => {
                try_push_escaped(bytes, &mut w, text)
                    && try_push(bytes, &mut w, end_tag(&cell.value))
            }
            value => {
                try_write_bounded_value(bytes, &mut w, value)
                    && try_push(bytes, &mut w, end_tag(&cell.value))
            }
        }
    };

    if done {
        buffer.advance(w);
    }
    done
}

/// Write a bounded fragment, flushing once if it does not fit
macro_rules! retry_after_flush {
    ($buffer:expr, $zip:expr, $attempt:expr) => {{
        if !$attempt {
            $buffer.flush_to($zip)?;
            let fitted = $attempt;
            debug_assert!(fitted, "fragment exceeds the minimum buffer size");
        }
    }};
}

fn write_fragment<W: Write>(
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
    fragment: &[u8],
) -> Result<()> {
    retry_after_flush!(buffer, zip, buffer.try_write(fragment));
    Ok(())
}

fn write_long_string<W: Write>(
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
    text: &str,
) -> Result<()> {
    let mut pos = 0;
    while !buffer.write_long_string(text, &mut pos) {
        buffer.flush_to(zip)?;
    }
    Ok(())
}

/// Guaranteed path: encode the cell completely, flushing as often as needed
pub(crate) fn write_cell<W: Write>(
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
    cell: &Cell,
    style_index: Option<u32>,
    position: Option<CellPosition>,
) -> Result<()> {
    // Retry the whole cell first: after one flush most cells fit in one go.
    if try_write_cell(buffer, cell, style_index, position) {
        return Ok(());
    }
    buffer.flush_to(zip)?;
    if try_write_cell(buffer, cell, style_index, position) {
        return Ok(());
    }

    // Oversized payload: only string content can get here.
    debug_assert!(can_write_piece_by_piece(cell));

    {
        let bytes = buffer.spare();
        let mut w = 0;
        let fitted = try_write_start(bytes, &mut w, cell, style_index, position);
        debug_assert!(fitted, "start fragment exceeds the minimum buffer size");
        buffer.advance(w);
    }

    if let Some(formula) = &cell.formula {
        write_long_string(buffer, zip, formula)?;
        match &cell.value {
            CellValue::Empty => write_fragment(buffer, zip, b"</f></c>")?,
            CellValue::String(text) => {
                write_fragment(buffer, zip, b"</f><v>")?;
                write_long_string(buffer, zip, text)?;
                write_fragment(buffer, zip, b"</v></c>")?;
            }
            value => {
                retry_after_flush!(buffer, zip, {
                    let bytes = buffer.spare();
                    let mut w = 0;
                    let done = try_push(bytes, &mut w, b"</f><v>")
                        && try_write_bounded_value(bytes, &mut w, value)
                        && try_push(bytes, &mut w, b"</v></c>");
                    if done {
                        buffer.advance(w);
                    }
                    done
                });
            }
        }
    } else if let CellValue::String(text) = &cell.value {
        write_long_string(buffer, zip, text)?;
        write_fragment(buffer, zip, end_tag(&cell.value))?;
    }

    Ok(())
}
