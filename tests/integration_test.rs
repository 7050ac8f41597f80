//! Integration tests for sheetstream
//!
//! The produced archives are parsed back with a minimal zip reader so the
//! tests check what a conformant reader would actually see.

use sheetstream::{
    Cell, CellValue, DataValidation, Font, ImageCanvas, RowOptions, SheetError, SheetVisibility,
    Style, Workbook, WorkbookOptions, WorksheetOptions,
};
use std::collections::HashMap;
use tempfile::NamedTempFile;

mod archive {
    use flate2::read::DeflateDecoder;
    use std::collections::HashMap;
    use std::io::Read;

    /// Walk the central directory and inflate every entry
    pub fn read(bytes: &[u8]) -> HashMap<String, Vec<u8>> {
        let eocd = bytes.len() - 22;
        assert_eq!(
            &bytes[eocd..eocd + 4],
            &[0x50, 0x4b, 0x05, 0x06],
            "missing end of central directory"
        );
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
}

fn text_entries(bytes: &[u8]) -> HashMap<String, String> {
    archive::read(bytes)
        .into_iter()
        .map(|(name, data)| (name, String::from_utf8(data).unwrap()))
        .collect()
}

#[test]
fn test_single_word_scenario() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Sheet", WorksheetOptions::default())
        .unwrap();
    sheet.add_row(&[Cell::new("OneWord")]).unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml
        .contains("<row r=\"1\"><c t=\"inlineStr\"><is><t>OneWord</t></is></c></row>"));
    assert!(entries["xl/workbook.xml"]
        .contains("<sheet name=\"Sheet\" sheetId=\"1\" r:id=\"rId1\"/>"));
    assert!(entries.contains_key("[Content_Types].xml"));
    assert!(entries.contains_key("_rels/.rels"));
    assert!(entries.contains_key("xl/_rels/workbook.xml.rels"));
}

#[test]
fn test_numeric_row() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Numbers", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row(&[Cell::new(1234i64), Cell::new(0i64), Cell::new(-1234i64)])
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<c><v>1234</v></c><c><v>0</v></c><c><v>-1234</v></c>"));
}

#[test]
fn test_value_kinds_textual_forms() {
    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();

    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Kinds", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row(&[
            Cell::new(true),
            Cell::new(false),
            Cell::new(2.5f64),
            Cell::new(date),
            Cell::new(CellValue::Empty),
        ])
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<c t=\"b\"><v>1</v></c><c t=\"b\"><v>0</v></c>"));
    assert!(sheet_xml.contains("<c><v>2.5</v></c>"));
    // Date serial with the default date-time style applied
    assert!(sheet_xml.contains("<c s=\"1\"><v>45292.5</v></c>"));
    assert!(sheet_xml.contains("<c/>"));

    // The default date-time format materializes in the styles document
    let styles_xml = &entries["xl/styles.xml"];
    assert!(styles_xml.contains("formatCode=\"yyyy-mm-dd hh:mm:ss\""));
}

#[test]
fn test_style_dedup_in_document() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let bold = Style {
        font: Font {
            bold: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let first = book.add_style(&bold);
    let second = book.add_style(&bold);
    assert_eq!(first, second);

    let mut sheet = book
        .start_worksheet("Styled", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row(&[Cell::styled("a", first), Cell::styled("b", second)])
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    // Both cells reference the identical style index
    let style_refs: Vec<&str> = sheet_xml.matches("s=\"2\"").collect();
    assert_eq!(style_refs.len(), 2);

    let styles_xml = &entries["xl/styles.xml"];
    // Default, the date-time default, the bold style and its date-time
    // variant share one deduplicated bold font
    assert!(styles_xml.contains("<cellXfs count=\"4\">"));
    assert_eq!(styles_xml.matches("<b/>").count(), 1);
}

#[test]
fn test_long_strings_across_buffer_boundaries() {
    let buffer_size = 512;
    for length in [0, 1, buffer_size - 1, buffer_size, buffer_size + 1, buffer_size * 3 + 17] {
        let options = WorkbookOptions {
            buffer_size,
            ..Default::default()
        };
        let text = "a".repeat(length);

        let mut book = Workbook::with_options(Vec::new(), options).unwrap();
        let mut sheet = book
            .start_worksheet("Long", WorksheetOptions::default())
            .unwrap();
        sheet.add_row(&[Cell::new(text.clone())]).unwrap();
        drop(sheet);
        let bytes = book.finish().unwrap();

        let entries = text_entries(&bytes);
        let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
        let expected = format!("<is><t>{text}</t></is>");
        assert!(
            sheet_xml.contains(&expected),
            "length {length} not reconstructed exactly"
        );
    }
}

#[test]
fn test_formula_cells() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Formulas", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row(&[Cell::new(10i64), Cell::new(20i64), Cell::formula("A1+B1", 30i64)])
        .unwrap();
    sheet
        .add_row(&[Cell::formula("A1&\"x\"", "10x"), Cell::new(CellValue::Empty)])
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<c><f>A1+B1</f><v>30</v></c>"));
    assert!(sheet_xml.contains("<c t=\"str\"><f>A1&amp;&quot;x&quot;</f><v>10x</v></c>"));
}

#[test]
fn test_try_add_row_fast_path() {
    let options = WorkbookOptions {
        buffer_size: 512,
        ..Default::default()
    };
    let mut book = Workbook::with_options(Vec::new(), options).unwrap();
    let mut sheet = book
        .start_worksheet("Fast", WorksheetOptions::default())
        .unwrap();

    assert!(sheet.try_add_row(&[Cell::new("fits")]));

    // Oversized row fails the fast path and completes on the slow path
    let long = "z".repeat(4096);
    let cells = vec![Cell::new(long.clone())];
    assert!(!sheet.try_add_row(&cells));
    sheet.add_row(&cells).unwrap();
    assert_eq!(sheet.next_row_number(), 3);
    drop(sheet);

    let bytes = book.finish().unwrap();
    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<row r=\"1\"><c t=\"inlineStr\"><is><t>fits</t></is></c></row>"));
    assert!(sheet_xml.contains(&long));
}

#[test]
fn test_row_options() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Rows", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row_with_options(
            &[Cell::new("tall")],
            &RowOptions {
                height: Some(30.0),
                hidden: false,
            },
        )
        .unwrap();
    sheet
        .add_row_with_options(
            &[Cell::new("hidden")],
            &RowOptions {
                height: None,
                hidden: true,
            },
        )
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<row r=\"1\" ht=\"30.0\" customHeight=\"1\">"));
    assert!(sheet_xml.contains("<row r=\"2\" hidden=\"1\">"));
}

#[test]
fn test_cell_reference_attributes_option() {
    let options = WorkbookOptions {
        write_cell_references: true,
        ..Default::default()
    };
    let mut book = Workbook::with_options(Vec::new(), options).unwrap();
    let mut sheet = book
        .start_worksheet("Refs", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row(&[Cell::new(1i64), Cell::new(2i64)])
        .unwrap();
    sheet.add_row(&[Cell::new(3i64)]).unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<c r=\"A1\"><v>1</v></c>"));
    assert!(sheet_xml.contains("<c r=\"B1\"><v>2</v></c>"));
    assert!(sheet_xml.contains("<c r=\"A2\"><v>3</v></c>"));
}

#[test]
fn test_multiple_worksheets_and_visibility() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("First", WorksheetOptions::default())
        .unwrap();
    sheet.add_row(&[Cell::new("one")]).unwrap();
    drop(sheet);

    let hidden = WorksheetOptions {
        visibility: SheetVisibility::Hidden,
        ..Default::default()
    };
    let mut sheet = book.start_worksheet("Second", hidden).unwrap();
    sheet.add_row(&[Cell::new("two")]).unwrap();
    drop(sheet);

    let bytes = book.finish().unwrap();
    let entries = text_entries(&bytes);
    assert!(entries["xl/worksheets/sheet1.xml"].contains("one"));
    assert!(entries["xl/worksheets/sheet2.xml"].contains("two"));

    let workbook_xml = &entries["xl/workbook.xml"];
    assert!(workbook_xml.contains("<sheet name=\"First\" sheetId=\"1\" r:id=\"rId1\"/>"));
    assert!(workbook_xml
        .contains("<sheet name=\"Second\" sheetId=\"2\" state=\"hidden\" r:id=\"rId2\"/>"));

    let rels = &entries["xl/_rels/workbook.xml.rels"];
    assert!(rels.contains("Target=\"worksheets/sheet2.xml\""));
}

#[test]
fn test_worksheet_name_boundaries() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    assert!(book
        .start_worksheet(&"x".repeat(31), WorksheetOptions::default())
        .is_ok());
    assert!(matches!(
        book.start_worksheet(&"y".repeat(32), WorksheetOptions::default()),
        Err(SheetError::InvalidWorksheetName { .. })
    ));
}

#[test]
fn test_finish_without_worksheets_is_rejected() {
    let book = Workbook::new(Vec::new()).unwrap();
    assert!(matches!(book.finish(), Err(SheetError::NoWorksheets)));
}

#[test]
fn test_merges_validations_and_notes() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Extras", WorksheetOptions::default())
        .unwrap();
    sheet.add_row(&[Cell::new("merged")]).unwrap();
    sheet.merge_cells("A1:B2").unwrap();
    // Overlap is intentionally not validated
    sheet.merge_cells("A1:C3").unwrap();
    sheet
        .add_data_validation("C1:C9", DataValidation::list_values(&["Yes", "No"]))
        .unwrap();
    sheet.add_note("A1", "remember this").unwrap();
    assert!(sheet.merge_cells("B2:A1").is_err());
    assert!(sheet.add_note("ZZZZ1", "bad ref").is_err());
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains(
        "<mergeCells count=\"2\"><mergeCell ref=\"A1:B2\"/><mergeCell ref=\"A1:C3\"/></mergeCells>"
    ));
    assert!(sheet_xml.contains("<dataValidation type=\"list\" sqref=\"C1:C9\""));
    assert!(sheet_xml.contains("<legacyDrawing r:id=\"rId1\"/>"));

    assert!(entries["xl/comments1.xml"].contains("remember this"));
    assert!(entries["xl/drawings/vmlDrawing1.vml"].contains("ObjectType=\"Note\""));
    assert!(entries["xl/worksheets/_rels/sheet1.xml.rels"].contains("comments1.xml"));
    assert!(entries["[Content_Types].xml"].contains("/xl/comments1.xml"));
    assert!(entries["[Content_Types].xml"].contains("Extension=\"vml\""));
}

fn tiny_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&2u32.to_be_bytes());
    bytes.extend_from_slice(&3u32.to_be_bytes());
    // Rest of the IHDR chunk plus a fake payload
    bytes.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0, 0xAB, 0xCD]);
    bytes
}

#[test]
fn test_embedded_images() {
    let png = tiny_png();

    let mut book = Workbook::new(Vec::new()).unwrap();
    let image = book.embed_image(png.as_slice()).unwrap();
    assert_eq!((image.width, image.height), (2, 3));

    let mut sheet = book
        .start_worksheet("Pics", WorksheetOptions::default())
        .unwrap();
    sheet.add_row(&[Cell::new("with image")]).unwrap();
    sheet
        .add_image(ImageCanvas::dimensions("B2", 100, 80).unwrap(), &image)
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = archive::read(&bytes);
    assert_eq!(entries["xl/media/image1.png"], png);

    let drawing = String::from_utf8(entries["xl/drawings/drawing1.xml"].clone()).unwrap();
    assert!(drawing.contains("<xdr:oneCellAnchor>"));
    assert!(drawing.contains("r:embed=\"rId1\""));

    let sheet_xml = String::from_utf8(entries["xl/worksheets/sheet1.xml"].clone()).unwrap();
    assert!(sheet_xml.contains("<drawing r:id=\"rId1\"/>"));

    let content_types =
        String::from_utf8(entries["[Content_Types].xml"].clone()).unwrap();
    assert!(content_types.contains("Extension=\"png\""));

    let rejected = Workbook::new(Vec::new())
        .unwrap()
        .embed_image(&b"not a png at all, long enough to read"[..]);
    assert!(matches!(rejected, Err(SheetError::UnsupportedImage(_))));
}

#[test]
fn test_named_styles() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let style = Style {
        font: Font {
            italic: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let id = book
        .add_named_style("Emphasis", &style, Some(sheetstream::StyleNameVisibility::Visible))
        .unwrap();
    assert_eq!(book.style_id("Emphasis").unwrap(), id);
    assert!(book.style_id("Unknown").is_err());

    let mut sheet = book
        .start_worksheet("Named", WorksheetOptions::default())
        .unwrap();
    sheet.add_row(&[Cell::styled("text", id)]).unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let styles_xml = &entries["xl/styles.xml"];
    assert!(styles_xml.contains("<cellStyle name=\"Emphasis\" xfId=\"1\"/>"));
    assert!(styles_xml.contains("<cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/>"));
}

#[test]
fn test_cancellation() {
    let token = sheetstream::CancelToken::new();
    let options = WorkbookOptions {
        buffer_size: 512,
        cancel: Some(token.clone()),
        ..Default::default()
    };
    let mut book = Workbook::with_options(Vec::new(), options).unwrap();
    let mut sheet = book
        .start_worksheet("Cancelled", WorksheetOptions::default())
        .unwrap();

    token.cancel();
    // A row larger than the buffer forces a flush, which observes the token
    let result = sheet.add_row(&[Cell::new("q".repeat(4096))]);
    assert!(matches!(result, Err(SheetError::Cancelled)));
}

#[test]
fn test_write_to_file() {
    let temp = NamedTempFile::new().unwrap();

    let mut book = Workbook::create(temp.path()).unwrap();
    let mut sheet = book
        .start_worksheet("OnDisk", WorksheetOptions::default())
        .unwrap();
    for i in 0..1000i64 {
        sheet
            .add_row(&[Cell::new(i), Cell::new(format!("row {i}"))])
            .unwrap();
    }
    drop(sheet);
    book.finish().unwrap();

    let bytes = std::fs::read(temp.path()).unwrap();
    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<row r=\"1000\">"));
    assert!(sheet_xml.contains("row 999"));
}

#[test]
fn test_plain_workbook_has_minimal_parts() {
    // With no default date-time format and no styles, no styles part is
    // written and the workbook rels stop at the worksheets.
    let options = WorkbookOptions {
        default_date_time_format: None,
        ..Default::default()
    };
    let mut book = Workbook::with_options(Vec::new(), options).unwrap();
    let mut sheet = book
        .start_worksheet("Plain", WorksheetOptions::default())
        .unwrap();
    sheet.add_row(&[Cell::new("data")]).unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    assert!(!entries.contains_key("xl/styles.xml"));
    assert!(!entries["xl/_rels/workbook.xml.rels"].contains("styles.xml"));
    assert!(!entries["[Content_Types].xml"].contains("styles.xml"));
}

#[test]
fn test_column_widths() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let options = WorksheetOptions {
        column_widths: vec![(1, 20.0), (3, 36.5)],
        ..Default::default()
    };
    let mut sheet = book.start_worksheet("Wide", options).unwrap();
    sheet.add_row(&[Cell::new("x")]).unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<col min=\"1\" max=\"1\" width=\"20.0\" customWidth=\"1\"/>"));
    assert!(sheet_xml.contains("<col min=\"3\" max=\"3\" width=\"36.5\" customWidth=\"1\"/>"));
}

#[test]
fn test_special_characters_escaped() {
    let mut book = Workbook::new(Vec::new()).unwrap();
    let mut sheet = book
        .start_worksheet("Escapes", WorksheetOptions::default())
        .unwrap();
    sheet
        .add_row(&[
            Cell::new("a<b>&\"'"),
            Cell::new("Ñoño 数据 😀"),
        ])
        .unwrap();
    drop(sheet);
    let bytes = book.finish().unwrap();

    let entries = text_entries(&bytes);
    let sheet_xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(sheet_xml.contains("<t>a&lt;b&gt;&amp;&quot;&apos;</t>"));
    assert!(sheet_xml.contains("<t>Ñoño 数据 😀</t>"));
}
