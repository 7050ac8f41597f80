//! Embedded images and the drawing parts that place them
//!
//! Image payloads are stored once under `xl/media/` when embedded; placing
//! one on a worksheet only records an anchor that the drawing part for that
//! worksheet serializes after the worksheet entry closes. PNG is the only
//! supported format.

use crate::buffer::SpreadsheetBuffer;
use crate::cellref::{CellRange, CellReference};
use crate::error::{Result, SheetError};
use crate::zip::StreamingZipWriter;
use std::io::Write;

/// EMUs per pixel at 96 DPI
const EMU_PER_PIXEL: u64 = 9_525;

/// Bytes needed to validate a PNG signature and read its dimensions
pub(crate) const IMAGE_HEADER_LENGTH: usize = 24;

/// Handle to an image payload stored in the archive.
///
/// Returned by the embed operation; placing the image on a worksheet
/// references this handle.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub(crate) id: u32,
    /// Pixel width parsed from the image header
    pub width: u32,
    /// Pixel height parsed from the image header
    pub height: u32,
}

/// Validate the PNG signature and pull the dimensions out of the IHDR chunk
pub(crate) fn parse_png_header(header: &[u8]) -> Result<(u32, u32)> {
    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    if header.len() < IMAGE_HEADER_LENGTH {
        return Err(SheetError::UnsupportedImage("image data is too short"));
    }
    if header[..8] != PNG_SIGNATURE {
        return Err(SheetError::UnsupportedImage("only PNG images are supported"));
    }
    if &header[12..16] != b"IHDR" {
        return Err(SheetError::UnsupportedImage("missing PNG IHDR chunk"));
    }

    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    if width == 0 || height == 0 {
        return Err(SheetError::UnsupportedImage("image has a zero dimension"));
    }
    Ok((width, height))
}

#[derive(Debug, Clone, Copy)]
enum CanvasSize {
    /// Natural pixel size of the image, optionally scaled
    Original { scale: f64 },
    /// Explicit pixel dimensions
    Pixels { width: u32, height: u32 },
    /// Stretch to a cell range
    FillCells { lower_right: CellReference },
}

/// Placement and size of an image on a worksheet
#[derive(Debug, Clone, Copy)]
pub struct ImageCanvas {
    upper_left: CellReference,
    size: CanvasSize,
}

impl ImageCanvas {
    /// Place the image at its natural size with the upper-left corner in
    /// the referenced cell
    pub fn original_size(upper_left: &str) -> Result<Self> {
        Ok(ImageCanvas {
            upper_left: CellReference::parse(upper_left)?,
            size: CanvasSize::Original { scale: 1.0 },
        })
    }

    /// Place the image at its natural size multiplied by `scale`
    pub fn scaled(upper_left: &str, scale: f64) -> Result<Self> {
        Ok(ImageCanvas {
            upper_left: CellReference::parse(upper_left)?,
            size: CanvasSize::Original { scale },
        })
    }

    /// Place the image with explicit pixel dimensions
    pub fn dimensions(upper_left: &str, width: u32, height: u32) -> Result<Self> {
        Ok(ImageCanvas {
            upper_left: CellReference::parse(upper_left)?,
            size: CanvasSize::Pixels { width, height },
        })
    }

    /// Stretch the image over a cell range like `"A1:C3"`
    pub fn fill_cells(range: &str) -> Result<Self> {
        let range = CellRange::parse(range)?;
        Ok(ImageCanvas {
            upper_left: range.from,
            size: CanvasSize::FillCells {
                lower_right: range.to,
            },
        })
    }
}

/// One placed image, recorded on the worksheet until its drawing part is
/// written
#[derive(Debug, Clone)]
pub(crate) struct WorksheetImage {
    pub canvas: ImageCanvas,
    pub image_id: u32,
    pub width: u32,
    pub height: u32,
    /// Running number across the whole document, used for the shape name
    pub number: u32,
}

fn push_anchor_marker(out: &mut Vec<u8>, tag: &[u8], cell: CellReference) {
    let mut num = itoa::Buffer::new();
    out.extend_from_slice(b"<xdr:");
    out.extend_from_slice(tag);
    out.extend_from_slice(b"><xdr:col>");
    out.extend_from_slice(num.format(cell.column - 1).as_bytes());
    out.extend_from_slice(b"</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>");
    out.extend_from_slice(num.format(cell.row - 1).as_bytes());
    out.extend_from_slice(b"</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:");
    out.extend_from_slice(tag);
    out.push(b'>');
}

fn push_picture(out: &mut Vec<u8>, image: &WorksheetImage, relationship: usize) {
    let mut num = itoa::Buffer::new();
    out.extend_from_slice(b"<xdr:pic><xdr:nvPicPr><xdr:cNvPr id=\"");
    out.extend_from_slice(num.format(image.number).as_bytes());
    out.extend_from_slice(b"\" name=\"Image ");
    out.extend_from_slice(num.format(image.number).as_bytes());
    out.extend_from_slice(b"\"/><xdr:cNvPicPr/></xdr:nvPicPr>");
    out.extend_from_slice(b"<xdr:blipFill><a:blip r:embed=\"rId");
    out.extend_from_slice(num.format(relationship).as_bytes());
    out.extend_from_slice(b"\"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>");
    out.extend_from_slice(
        b"<xdr:spPr><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></xdr:spPr></xdr:pic>",
    );
}

/// Write `xl/drawings/drawing{n}.xml` for one worksheet's images
pub(crate) fn write_drawing_xml<W: Write>(
    images: &[WorksheetImage],
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut out = Vec::with_capacity(1024);
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<xdr:wsDr xmlns:xdr=\"http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing\" \
          xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
          xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    );
    buffer.write_all_chunked(&out, zip)?;

    let mut num = itoa::Buffer::new();
    for (index, image) in images.iter().enumerate() {
        out.clear();
        match image.canvas.size {
            CanvasSize::FillCells { lower_right } => {
                out.extend_from_slice(b"<xdr:twoCellAnchor editAs=\"twoCell\">");
                push_anchor_marker(&mut out, b"from", image.canvas.upper_left);
                push_anchor_marker(&mut out, b"to", lower_right);
                push_picture(&mut out, image, index + 1);
                out.extend_from_slice(b"<xdr:clientData/></xdr:twoCellAnchor>");
            }
            size => {
                let (width, height) = match size {
                    CanvasSize::Original { scale } => (
                        (f64::from(image.width) * scale) as u64,
                        (f64::from(image.height) * scale) as u64,
                    ),
                    CanvasSize::Pixels { width, height } => (u64::from(width), u64::from(height)),
                    CanvasSize::FillCells { .. } => unreachable!("handled above"),
                };
                out.extend_from_slice(b"<xdr:oneCellAnchor>");
                push_anchor_marker(&mut out, b"from", image.canvas.upper_left);
                out.extend_from_slice(b"<xdr:ext cx=\"");
                out.extend_from_slice(num.format(width * EMU_PER_PIXEL).as_bytes());
                out.extend_from_slice(b"\" cy=\"");
                out.extend_from_slice(num.format(height * EMU_PER_PIXEL).as_bytes());
                out.extend_from_slice(b"\"/>");
                push_picture(&mut out, image, index + 1);
                out.extend_from_slice(b"<xdr:clientData/></xdr:oneCellAnchor>");
            }
        }
        buffer.write_all_chunked(&out, zip)?;
    }

    buffer.write_all_chunked(b"</xdr:wsDr>", zip)?;
    buffer.flush_to(zip)?;
    Ok(())
}

/// Write the relationship part tying a drawing to its media entries
pub(crate) fn write_drawing_rels_xml<W: Write>(
    images: &[WorksheetImage],
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let mut out = Vec::with_capacity(512);
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );

    let mut num = itoa::Buffer::new();
    for (index, image) in images.iter().enumerate() {
        out.extend_from_slice(b"<Relationship Id=\"rId");
        out.extend_from_slice(num.format(index + 1).as_bytes());
        out.extend_from_slice(
            b"\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/image\" \
              Target=\"../media/image",
        );
        out.extend_from_slice(num.format(image.image_id).as_bytes());
        out.extend_from_slice(b".png\"/>");
    }
    out.extend_from_slice(b"</Relationships>");
    buffer.write_all_chunked(&out, zip)?;
    buffer.flush_to(zip)?;
    Ok(())
}
