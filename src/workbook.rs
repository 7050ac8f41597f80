//! Workbook coordinator: archive ownership and worksheet lifecycle
//!
//! A [`Workbook`] owns the streaming zip archive, the shared write buffer
//! and the style table. At most one worksheet is active at a time; starting
//! a new one finishes the previous one, and [`Workbook::finish`] consumes
//! the workbook, so no content can be added afterwards.

use crate::buffer::{SpreadsheetBuffer, CancelToken, DEFAULT_BUFFER_SIZE};
use crate::cellref::{CellRange, CellReference};
use crate::error::{Result, SheetError};
use crate::images::{
    parse_png_header, write_drawing_rels_xml, write_drawing_xml, EmbeddedImage, ImageCanvas,
    WorksheetImage, IMAGE_HEADER_LENGTH,
};
use crate::metadata::{
    write_content_types, write_root_rels, write_workbook_rels, write_workbook_xml,
    write_worksheet_rels, SheetMetadata,
};
use crate::notes::{write_comments_xml, write_vml_drawing_xml, Note, MAX_NOTE_TEXT_LENGTH};
use crate::styles::{
    write_styles_xml, NumberFormat, Style, StyleId, StyleNameVisibility, StyleRegistry,
};
use crate::types::{Cell, RowOptions, WorksheetOptions};
use crate::validation::{DataValidation, MAX_DATA_VALIDATIONS};
use crate::worksheet::{self, ActiveSheet};
use crate::zip::StreamingZipWriter;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Maximum worksheet name length in characters
const MAX_SHEET_NAME_LENGTH: usize = 31;

/// Options applied when a workbook is created
#[derive(Debug, Clone)]
pub struct WorkbookOptions {
    /// Size of the reusable write buffer, at least
    /// [`MIN_BUFFER_SIZE`](crate::buffer::MIN_BUFFER_SIZE)
    pub buffer_size: usize,
    /// Deflate compression level, 0-9
    pub compression_level: u32,
    /// Number format applied to date-time cells that have no explicit
    /// style. `None` writes bare serial numbers.
    pub default_date_time_format: Option<NumberFormat>,
    /// Emit `r="A1"`-style reference attributes on every row and cell
    pub write_cell_references: bool,
    /// Cooperative cancellation token checked at every buffer flush
    pub cancel: Option<CancelToken>,
}

impl Default for WorkbookOptions {
    fn default() -> Self {
        WorkbookOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            compression_level: 6,
            default_date_time_format: Some(NumberFormat::custom("yyyy-mm-dd hh:mm:ss")),
            write_cell_references: false,
            cancel: None,
        }
    }
}

/// Streaming workbook writer over any byte sink
pub struct Workbook<W: Write> {
    zip: StreamingZipWriter<W>,
    buffer: SpreadsheetBuffer,
    styles: StyleRegistry,
    sheets: Vec<SheetMetadata>,
    active: Option<ActiveSheet>,
    write_cell_references: bool,
    total_embedded_images: u32,
    total_added_images: u32,
    sheets_with_notes: u32,
    sheets_with_images: u32,
}

impl Workbook<BufWriter<File>> {
    /// Create a workbook writing to a file with default options
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Workbook::new(BufWriter::with_capacity(64 * 1024, file))
    }
}

impl<W: Write> Workbook<W> {
    /// Create a workbook with default options
    pub fn new(sink: W) -> Result<Self> {
        Workbook::with_options(sink, WorkbookOptions::default())
    }

    /// Create a workbook with explicit options
    pub fn with_options(sink: W, options: WorkbookOptions) -> Result<Self> {
        let mut buffer = SpreadsheetBuffer::new(options.buffer_size, options.cancel)?;
        let mut zip = StreamingZipWriter::new(sink, options.compression_level);
        write_root_rels(&mut buffer, &mut zip)?;

        Ok(Workbook {
            zip,
            buffer,
            styles: StyleRegistry::new(options.default_date_time_format),
            sheets: Vec::new(),
            active: None,
            write_cell_references: options.write_cell_references,
            total_embedded_images: 0,
            total_added_images: 0,
            sheets_with_notes: 0,
            sheets_with_images: 0,
        })
    }

    /// Register a reusable style and get its handle. Registering an equal
    /// definition again returns the same handle.
    pub fn add_style(&mut self, style: &Style) -> StyleId {
        self.styles.add(style)
    }

    /// Register a style under a unique name for later lookup with
    /// [`style_id`](Self::style_id)
    pub fn add_named_style(
        &mut self,
        name: &str,
        style: &Style,
        visibility: Option<StyleNameVisibility>,
    ) -> Result<StyleId> {
        self.styles.add_named(name, style, visibility)
    }

    /// Look up the handle of a previously registered named style
    pub fn style_id(&self, name: &str) -> Result<StyleId> {
        self.styles.get_named(name)
    }

    /// Embed a PNG image into the archive. Must happen before the first
    /// worksheet is started; the returned handle is placed on worksheets
    /// with [`SheetWriter::add_image`].
    pub fn embed_image<R: Read>(&mut self, mut image: R) -> Result<EmbeddedImage> {
        if !self.sheets.is_empty() {
            return Err(SheetError::ImageEmbeddedTooLate);
        }

        let mut header = [0u8; IMAGE_HEADER_LENGTH];
        let mut filled = 0;
        while filled < header.len() {
            let n = image.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let (width, height) = parse_png_header(&header[..filled])?;

        self.total_embedded_images += 1;
        let id = self.total_embedded_images;

        let mut num = itoa::Buffer::new();
        let mut path = String::from("xl/media/image");
        path.push_str(num.format(id));
        path.push_str(".png");
        self.zip.start_entry(&path)?;
        self.zip.write_data(&header[..filled])?;
        std::io::copy(&mut image, &mut self.zip)?;

        Ok(EmbeddedImage { id, width, height })
    }

    /// Start a new worksheet, implicitly finishing the active one.
    ///
    /// Row and collection operations are only available through the
    /// returned writer, which borrows the workbook for the worksheet's
    /// lifetime.
    pub fn start_worksheet(
        &mut self,
        name: &str,
        options: WorksheetOptions,
    ) -> Result<SheetWriter<'_, W>> {
        validate_sheet_name(name)?;
        if self
            .sheets
            .iter()
            .any(|sheet| sheet.name.to_lowercase() == name.to_lowercase())
        {
            return Err(SheetError::DuplicateWorksheetName(name.to_string()));
        }

        self.finish_active_worksheet()?;

        let mut num = itoa::Buffer::new();
        let mut path = String::from("xl/worksheets/sheet");
        path.push_str(num.format(self.sheets.len() + 1));
        path.push_str(".xml");
        self.zip.start_entry(&path)?;
        worksheet::write_sheet_head(&options, &mut self.buffer, &mut self.zip)?;

        self.sheets.push(SheetMetadata {
            name: name.to_string(),
            visibility: options.visibility,
            comments_part: None,
            drawing_part: None,
        });
        self.active = Some(ActiveSheet::new());
        Ok(SheetWriter { book: self })
    }

    /// Write the footer of the active worksheet and its auxiliary parts
    fn finish_active_worksheet(&mut self) -> Result<()> {
        let Some(sheet) = self.active.take() else {
            return Ok(());
        };

        let has_notes = !sheet.notes.is_empty();
        let has_images = !sheet.images.is_empty();
        worksheet::write_sheet_foot(
            &sheet,
            has_images,
            has_notes,
            &mut self.buffer,
            &mut self.zip,
        )?;

        // Auxiliary part paths are keyed by the running count of worksheets
        // that have notes respectively images, so they are written now, not
        // at finish time.
        let mut num = itoa::Buffer::new();
        let mut comments_part = None;
        let mut drawing_part = None;

        if has_notes {
            self.sheets_with_notes += 1;
            let part = self.sheets_with_notes;
            comments_part = Some(part);

            let mut path = String::from("xl/comments");
            path.push_str(num.format(part));
            path.push_str(".xml");
            self.zip.start_entry(&path)?;
            write_comments_xml(&sheet.notes, &mut self.buffer, &mut self.zip)?;

            let mut path = String::from("xl/drawings/vmlDrawing");
            path.push_str(num.format(part));
            path.push_str(".vml");
            self.zip.start_entry(&path)?;
            write_vml_drawing_xml(&sheet.notes, &mut self.buffer, &mut self.zip)?;
        }

        if has_images {
            self.sheets_with_images += 1;
            let part = self.sheets_with_images;
            drawing_part = Some(part);

            let mut path = String::from("xl/drawings/drawing");
            path.push_str(num.format(part));
            path.push_str(".xml");
            self.zip.start_entry(&path)?;
            write_drawing_xml(&sheet.images, &mut self.buffer, &mut self.zip)?;

            let mut path = String::from("xl/drawings/_rels/drawing");
            path.push_str(num.format(part));
            path.push_str(".xml.rels");
            self.zip.start_entry(&path)?;
            write_drawing_rels_xml(&sheet.images, &mut self.buffer, &mut self.zip)?;
        }

        if let Some(meta) = self.sheets.last_mut() {
            meta.comments_part = comments_part;
            meta.drawing_part = drawing_part;
        }

        if has_notes || has_images {
            write_worksheet_rels(
                self.sheets.len(),
                drawing_part,
                comments_part,
                &mut self.buffer,
                &mut self.zip,
            )?;
        }

        Ok(())
    }

    /// Finalize the workbook: finish the active worksheet, write the
    /// metadata documents, seal the archive and hand the sink back.
    ///
    /// Consumes the workbook, so nothing can be added afterwards.
    pub fn finish(mut self) -> Result<W> {
        if self.sheets.is_empty() {
            return Err(SheetError::NoWorksheets);
        }
        self.finish_active_worksheet()?;

        let has_styles = self.styles.is_active();
        write_content_types(
            &self.sheets,
            has_styles,
            self.total_embedded_images > 0,
            &mut self.buffer,
            &mut self.zip,
        )?;
        write_workbook_rels(self.sheets.len(), has_styles, &mut self.buffer, &mut self.zip)?;
        write_workbook_xml(&self.sheets, &mut self.buffer, &mut self.zip)?;
        if has_styles {
            self.zip.start_entry("xl/styles.xml")?;
            write_styles_xml(&self.styles, &mut self.buffer, &mut self.zip)?;
        }

        self.zip.finish()
    }
}

fn validate_sheet_name(name: &str) -> Result<()> {
    let invalid = |reason| SheetError::InvalidWorksheetName {
        name: name.to_string(),
        reason,
    };
    if name.trim().is_empty() {
        return Err(invalid("name must not be empty or whitespace"));
    }
    if name.chars().count() > MAX_SHEET_NAME_LENGTH {
        return Err(invalid("name must be at most 31 characters"));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(invalid("name must not start or end with a single quote"));
    }
    if name.contains(['/', '\\', '?', '*', '[', ']']) {
        return Err(invalid("name must not contain any of / \\ ? * [ ]"));
    }
    Ok(())
}

/// Writer for the one active worksheet, borrowing the workbook.
///
/// Dropping the writer leaves the worksheet open; it is closed when the
/// next worksheet starts or the workbook finishes.
pub struct SheetWriter<'a, W: Write> {
    book: &'a mut Workbook<W>,
}

impl<W: Write> SheetWriter<'_, W> {
    fn sheet(&mut self) -> &mut ActiveSheet {
        // The writer only exists while a worksheet is active
        self.book
            .active
            .as_mut()
            .unwrap_or_else(|| unreachable!("sheet writer without active worksheet"))
    }

    /// Row number the next added row will get; the first row is 1
    pub fn next_row_number(&self) -> u32 {
        self.book
            .active
            .as_ref()
            .map_or(1, ActiveSheet::next_row_number)
    }

    /// Fast path: add the row only if it fits in the buffer without
    /// flushing. On `false` the caller must complete the same row with
    /// [`add_row`](Self::add_row).
    pub fn try_add_row(&mut self, cells: &[Cell]) -> bool {
        let write_refs = self.book.write_cell_references;
        let default_date_time = self.book.styles.default_date_time_style();
        let Workbook { active, buffer, .. } = &mut *self.book;
        let sheet = active
            .as_mut()
            .unwrap_or_else(|| unreachable!("sheet writer without active worksheet"));
        worksheet::try_add_row(sheet, buffer, cells, None, write_refs, default_date_time)
    }

    /// Add a row of cells, flushing to the sink as often as needed
    pub fn add_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.add_row_inner(cells, None)
    }

    /// Add a row with custom height or hidden flag
    pub fn add_row_with_options(&mut self, cells: &[Cell], options: &RowOptions) -> Result<()> {
        self.add_row_inner(cells, Some(options))
    }

    fn add_row_inner(&mut self, cells: &[Cell], options: Option<&RowOptions>) -> Result<()> {
        let write_refs = self.book.write_cell_references;
        let default_date_time = self.book.styles.default_date_time_style();
        let Workbook {
            active,
            buffer,
            zip,
            ..
        } = &mut *self.book;
        let sheet = active
            .as_mut()
            .unwrap_or_else(|| unreachable!("sheet writer without active worksheet"));
        worksheet::add_row(sheet, buffer, zip, cells, options, write_refs, default_date_time)
    }

    /// Merge a range of cells. Only the content of the upper-left cell
    /// shows in the merged cell; overlapping merges are not validated.
    pub fn merge_cells(&mut self, range: &str) -> Result<()> {
        let range = CellRange::parse(range)?;
        self.sheet().merges.push(range);
        Ok(())
    }

    /// Add a data validation rule for a cell or range. At most 65534 rules
    /// per worksheet; exceeding the cap is an error.
    pub fn add_data_validation(&mut self, reference: &str, validation: DataValidation) -> Result<()> {
        if !self.try_add_data_validation(reference, validation)? {
            return Err(SheetError::TooManyDataValidations(MAX_DATA_VALIDATIONS));
        }
        Ok(())
    }

    /// Like [`add_data_validation`](Self::add_data_validation), but reports
    /// the cap as `Ok(false)` instead of an error
    pub fn try_add_data_validation(
        &mut self,
        reference: &str,
        validation: DataValidation,
    ) -> Result<bool> {
        let range = CellRange::parse(reference)?;
        let sheet = self.sheet();
        if sheet.validations.len() >= MAX_DATA_VALIDATIONS {
            return Ok(false);
        }
        sheet.validations.push((range, validation));
        Ok(true)
    }

    /// Add a plain text note to a cell, shown as a comment box
    pub fn add_note(&mut self, reference: &str, text: &str) -> Result<()> {
        let reference = CellReference::parse(reference)?;
        let length = text.chars().count();
        if length > MAX_NOTE_TEXT_LENGTH {
            return Err(SheetError::NoteTextTooLong {
                length,
                max: MAX_NOTE_TEXT_LENGTH,
            });
        }
        self.sheet().notes.push(Note {
            reference,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Place a previously embedded image on this worksheet
    pub fn add_image(&mut self, canvas: ImageCanvas, image: &EmbeddedImage) -> Result<()> {
        self.book.total_added_images += 1;
        let number = self.book.total_added_images;
        let placed = WorksheetImage {
            canvas,
            image_id: image.id,
            width: image.width,
            height: image.height,
            number,
        };
        self.sheet().images.push(placed);
        Ok(())
    }

    /// Register a reusable style, see [`Workbook::add_style`]
    pub fn add_style(&mut self, style: &Style) -> StyleId {
        self.book.add_style(style)
    }
}
