//! Cell notes and their auxiliary documents
//!
//! Notes live outside the worksheet body: the text goes into a comments
//! part and the on-screen note box into a legacy VML drawing part, both
//! emitted right after the owning worksheet's entry is closed.

use crate::buffer::SpreadsheetBuffer;
use crate::cellref::CellReference;
use crate::error::Result;
use crate::styles::push_escaped;
use crate::zip::StreamingZipWriter;
use std::io::Write;

/// Maximum length of a note's text in characters
pub const MAX_NOTE_TEXT_LENGTH: usize = 32_768;

#[derive(Debug, Clone)]
pub(crate) struct Note {
    pub reference: CellReference,
    pub text: String,
}

/// Write `xl/comments{n}.xml` for one worksheet's notes
pub(crate) fn write_comments_xml<W: Write>(
    notes: &[Note],
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut out = Vec::with_capacity(512);
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<comments xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
    );
    out.extend_from_slice(b"<authors><author/></authors><commentList>");
    buffer.write_all_chunked(&out, zip)?;

    for note in notes {
        out.clear();
        out.extend_from_slice(b"<comment ref=\"");
        note.reference.push_to(&mut out);
        out.extend_from_slice(b"\" authorId=\"0\"><text><t xml:space=\"preserve\">");
        push_escaped(&mut out, &note.text);
        out.extend_from_slice(b"</t></text></comment>");
        buffer.write_all_chunked(&out, zip)?;
    }

    buffer.write_all_chunked(b"</commentList></comments>", zip)?;
    buffer.flush_to(zip)?;
    Ok(())
}

/// Write `xl/drawings/vmlDrawing{n}.vml`, one note shape per note
pub(crate) fn write_vml_drawing_xml<W: Write>(
    notes: &[Note],
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut out = Vec::with_capacity(1024);
    out.extend_from_slice(
        b"<xml xmlns:v=\"urn:schemas-microsoft-com:vml\" \
          xmlns:o=\"urn:schemas-microsoft-com:office:office\" \
          xmlns:x=\"urn:schemas-microsoft-com:office:excel\">",
    );
    out.extend_from_slice(
        b"<o:shapelayout v:ext=\"edit\"><o:idmap v:ext=\"edit\" data=\"1\"/></o:shapelayout>\
          <v:shapetype id=\"_x0000_t202\" coordsize=\"21600,21600\" o:spt=\"202\" \
          path=\"m,l,21600r21600,l21600,xe\">\
          <v:stroke joinstyle=\"miter\"/>\
          <v:path gradientshapeok=\"t\" o:connecttype=\"rect\"/>\
          </v:shapetype>",
    );
    buffer.write_all_chunked(&out, zip)?;

    let mut num = itoa::Buffer::new();
    for (index, note) in notes.iter().enumerate() {
        out.clear();
        out.extend_from_slice(b"<v:shape id=\"_x0000_s");
        out.extend_from_slice(num.format(1025 + index).as_bytes());
        out.extend_from_slice(
            b"\" type=\"#_x0000_t202\" style=\"position:absolute;margin-left:57pt;\
              margin-top:1.5pt;width:96pt;height:55.5pt;z-index:1;visibility:hidden\" \
              fillcolor=\"#ffffe1\" o:insetmode=\"auto\">",
        );
        out.extend_from_slice(b"<v:fill color2=\"#ffffe1\"/>");
        out.extend_from_slice(b"<v:shadow on=\"t\" color=\"black\" obscured=\"t\"/>");
        out.extend_from_slice(b"<x:ClientData ObjectType=\"Note\">");
        out.extend_from_slice(b"<x:MoveWithCells/><x:SizeWithCells/>");

        // Anchor: left col, left offset, top row, top offset, right col,
        // right offset, bottom row, bottom offset (rows/cols 0-based)
        let column = note.reference.column;
        let row = note.reference.row;
        out.extend_from_slice(b"<x:Anchor>");
        out.extend_from_slice(num.format(column).as_bytes());
        out.extend_from_slice(b", 15, ");
        out.extend_from_slice(num.format(row.saturating_sub(1)).as_bytes());
        out.extend_from_slice(b", 2, ");
        out.extend_from_slice(num.format(column + 2).as_bytes());
        out.extend_from_slice(b", 15, ");
        out.extend_from_slice(num.format(row + 2).as_bytes());
        out.extend_from_slice(b", 16</x:Anchor>");

        out.extend_from_slice(b"<x:AutoFill>False</x:AutoFill><x:Row>");
        out.extend_from_slice(num.format(row - 1).as_bytes());
        out.extend_from_slice(b"</x:Row><x:Column>");
        out.extend_from_slice(num.format(column - 1).as_bytes());
        out.extend_from_slice(b"</x:Column></x:ClientData></v:shape>");
        buffer.write_all_chunked(&out, zip)?;
    }

    buffer.write_all_chunked(b"</xml>", zip)?;
    buffer.flush_to(zip)?;
    Ok(())
}
