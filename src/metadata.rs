//! Package-level metadata documents
//!
//! Content types, relationship parts and the workbook manifest. These are
//! written at fixed points: the package relationships up front, everything
//! else at finish time, in the order the parts reference each other.

use crate::buffer::SpreadsheetBuffer;
use crate::error::Result;
use crate::styles::push_escaped;
use crate::types::SheetVisibility;
use crate::zip::StreamingZipWriter;
use std::io::Write;

/// One started worksheet, immutable once added to the workbook's list
#[derive(Debug, Clone)]
pub(crate) struct SheetMetadata {
    pub name: String,
    pub visibility: SheetVisibility,
    /// Global number of this sheet's comments/vml parts, when it has notes
    pub comments_part: Option<u32>,
    /// Global number of this sheet's drawing part, when it has images
    pub drawing_part: Option<u32>,
}

/// Write `_rels/.rels`, pointing the package at the workbook part
pub(crate) fn write_root_rels<W: Write>(
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    zip.start_entry("_rels/.rels")?;
    let xml: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
</Relationships>";
    buffer.write_all_chunked(xml, zip)?;
    buffer.flush_to(zip)
}

/// Write `[Content_Types].xml` listing every distinct part and extension
pub(crate) fn write_content_types<W: Write>(
    sheets: &[SheetMetadata],
    has_styles: bool,
    has_images: bool,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    zip.start_entry("[Content_Types].xml")?;

    let mut out = Vec::with_capacity(1024);
    let mut num = itoa::Buffer::new();
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    );
    if has_images {
        out.extend_from_slice(b"<Default Extension=\"png\" ContentType=\"image/png\"/>");
    }
    if sheets.iter().any(|sheet| sheet.comments_part.is_some()) {
        out.extend_from_slice(
            b"<Default Extension=\"vml\" ContentType=\"application/vnd.openxmlformats-officedocument.vmlDrawing\"/>",
        );
    }
    out.extend_from_slice(
        b"<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    );
    buffer.write_all_chunked(&out, zip)?;

    for (index, sheet) in sheets.iter().enumerate() {
        out.clear();
        out.extend_from_slice(b"<Override PartName=\"/xl/worksheets/sheet");
        out.extend_from_slice(num.format(index + 1).as_bytes());
        out.extend_from_slice(
            b".xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
        );
        if let Some(part) = sheet.comments_part {
            out.extend_from_slice(b"<Override PartName=\"/xl/comments");
            out.extend_from_slice(num.format(part).as_bytes());
            out.extend_from_slice(
                b".xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml\"/>",
            );
        }
        if let Some(part) = sheet.drawing_part {
            out.extend_from_slice(b"<Override PartName=\"/xl/drawings/drawing");
            out.extend_from_slice(num.format(part).as_bytes());
            out.extend_from_slice(
                b".xml\" ContentType=\"application/vnd.openxmlformats-officedocument.drawing+xml\"/>",
            );
        }
        buffer.write_all_chunked(&out, zip)?;
    }

    out.clear();
    if has_styles {
        out.extend_from_slice(
            b"<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>",
        );
    }
    out.extend_from_slice(b"</Types>");
    buffer.write_all_chunked(&out, zip)?;
    buffer.flush_to(zip)
}

/// Write `xl/_rels/workbook.xml.rels`: worksheets, then styles if present
pub(crate) fn write_workbook_rels<W: Write>(
    sheet_count: usize,
    has_styles: bool,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    zip.start_entry("xl/_rels/workbook.xml.rels")?;

    let mut out = Vec::with_capacity(512);
    let mut num = itoa::Buffer::new();
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    buffer.write_all_chunked(&out, zip)?;

    for index in 1..=sheet_count {
        out.clear();
        out.extend_from_slice(b"<Relationship Id=\"rId");
        out.extend_from_slice(num.format(index).as_bytes());
        out.extend_from_slice(
            b"\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet",
        );
        out.extend_from_slice(num.format(index).as_bytes());
        out.extend_from_slice(b".xml\"/>");
        buffer.write_all_chunked(&out, zip)?;
    }

    out.clear();
    if has_styles {
        out.extend_from_slice(b"<Relationship Id=\"rId");
        out.extend_from_slice(num.format(sheet_count + 1).as_bytes());
        out.extend_from_slice(
            b"\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
        );
    }
    out.extend_from_slice(b"</Relationships>");
    buffer.write_all_chunked(&out, zip)?;
    buffer.flush_to(zip)
}

/// Write `xl/workbook.xml`: the sheet list in order, with visibility
pub(crate) fn write_workbook_xml<W: Write>(
    sheets: &[SheetMetadata],
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    zip.start_entry("xl/workbook.xml")?;

    let mut out = Vec::with_capacity(512);
    let mut num = itoa::Buffer::new();
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
          xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>",
    );
    buffer.write_all_chunked(&out, zip)?;

    for (index, sheet) in sheets.iter().enumerate() {
        out.clear();
        out.extend_from_slice(b"<sheet name=\"");
        push_escaped(&mut out, &sheet.name);
        out.extend_from_slice(b"\" sheetId=\"");
        out.extend_from_slice(num.format(index + 1).as_bytes());
        out.push(b'"');
        if sheet.visibility == SheetVisibility::Hidden {
            out.extend_from_slice(b" state=\"hidden\"");
        }
        out.extend_from_slice(b" r:id=\"rId");
        out.extend_from_slice(num.format(index + 1).as_bytes());
        out.extend_from_slice(b"\"/>");
        buffer.write_all_chunked(&out, zip)?;
    }

    buffer.write_all_chunked(b"</sheets></workbook>", zip)?;
    buffer.flush_to(zip)
}

/// Write `xl/worksheets/_rels/sheet{k}.xml.rels` for a sheet with notes or
/// images. Relationship ids match the references in the worksheet footer:
/// rId1 is the drawing when present, the vml and comments parts follow.
pub(crate) fn write_worksheet_rels<W: Write>(
    sheet_index: usize,
    drawing_part: Option<u32>,
    comments_part: Option<u32>,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut num = itoa::Buffer::new();
    let mut path = String::from("xl/worksheets/_rels/sheet");
    path.push_str(num.format(sheet_index));
    path.push_str(".xml.rels");
    zip.start_entry(&path)?;

    let mut out = Vec::with_capacity(512);
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );

    if let Some(part) = drawing_part {
        out.extend_from_slice(b"<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing\" Target=\"../drawings/drawing");
        out.extend_from_slice(num.format(part).as_bytes());
        out.extend_from_slice(b".xml\"/>");
    }
    if let Some(part) = comments_part {
        let relationship = if drawing_part.is_some() { 2 } else { 1 };
        out.extend_from_slice(b"<Relationship Id=\"rId");
        out.extend_from_slice(num.format(relationship).as_bytes());
        out.extend_from_slice(b"\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing\" Target=\"../drawings/vmlDrawing");
        out.extend_from_slice(num.format(part).as_bytes());
        out.extend_from_slice(b".vml\"/>");
        out.extend_from_slice(b"<Relationship Id=\"rId");
        out.extend_from_slice(num.format(relationship + 1).as_bytes());
        out.extend_from_slice(b"\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments\" Target=\"../comments");
        out.extend_from_slice(num.format(part).as_bytes());
        out.extend_from_slice(b".xml\"/>");
    }
    out.extend_from_slice(b"</Relationships>");
    buffer.write_all_chunked(&out, zip)?;
    buffer.flush_to(zip)
}
