//! Cell styling and the deduplicated style table
//!
//! Style definitions are immutable aggregates deduplicated into a single
//! table; fonts, fills, borders and custom number formats each get their own
//! index space when the styles document is written. The default style is
//! pre-seeded at index 0 because the format requires it to exist.

use crate::buffer::SpreadsheetBuffer;
use crate::error::{Result, SheetError};
use crate::zip::StreamingZipWriter;
use indexmap::{IndexMap, IndexSet};
use std::io::Write;

/// Maximum length of a style name
const MAX_STYLE_NAME_LENGTH: usize = 255;

/// Custom number formats are numbered sequentially from here, above the
/// predefined format id range.
const CUSTOM_NUMBER_FORMAT_BASE: u16 = 165;

/// An ARGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Fully opaque color from RGB components
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { a: 0xFF, r, g, b }
    }

    fn push_argb(&self, out: &mut Vec<u8>) {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        for byte in [self.a, self.r, self.g, self.b] {
            out.push(HEX[(byte >> 4) as usize]);
            out.push(HEX[(byte & 0xF) as usize]);
        }
    }
}

/// Font part of a style definition
///
/// `size` is in twentieths of a point (220 = 11pt) so the type stays
/// hashable for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Font {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub size: u32,
    pub color: Option<Color>,
    pub name: String,
}

impl Default for Font {
    fn default() -> Self {
        Font {
            bold: false,
            italic: false,
            strikethrough: false,
            underline: false,
            size: 220,
            color: None,
            name: "Calibri".into(),
        }
    }
}

impl Font {
    fn push_xml(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<font>");
        if self.bold {
            out.extend_from_slice(b"<b/>");
        }
        if self.italic {
            out.extend_from_slice(b"<i/>");
        }
        if self.strikethrough {
            out.extend_from_slice(b"<strike/>");
        }
        if self.underline {
            out.extend_from_slice(b"<u/>");
        }
        out.extend_from_slice(b"<sz val=\"");
        push_point_size(out, self.size);
        out.extend_from_slice(b"\"/>");
        if let Some(color) = &self.color {
            out.extend_from_slice(b"<color rgb=\"");
            color.push_argb(out);
            out.extend_from_slice(b"\"/>");
        }
        out.extend_from_slice(b"<name val=\"");
        push_escaped(out, &self.name);
        out.extend_from_slice(b"\"/></font>");
    }
}

/// Twentieths of a point rendered as a decimal point size (230 -> "11.5")
fn push_point_size(out: &mut Vec<u8>, twentieths: u32) {
    let mut num = itoa::Buffer::new();
    out.extend_from_slice(num.format(twentieths / 20).as_bytes());
    // Fractional part in hundredths of a point
    let frac = (twentieths % 20) * 5;
    if frac > 0 {
        out.push(b'.');
        if frac < 10 {
            out.push(b'0');
        }
        let formatted = num.format(frac);
        out.extend_from_slice(formatted.trim_end_matches('0').as_bytes());
    }
}

/// Fill part of a style definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fill {
    #[default]
    None,
    Solid(Color),
}

impl Fill {
    fn push_xml(&self, out: &mut Vec<u8>) {
        match self {
            Fill::None => out.extend_from_slice(b"<fill><patternFill patternType=\"none\"/></fill>"),
            Fill::Solid(color) => {
                out.extend_from_slice(b"<fill><patternFill patternType=\"solid\"><fgColor rgb=\"");
                color.push_argb(out);
                out.extend_from_slice(b"\"/></patternFill></fill>");
            }
        }
    }
}

/// Line style of a border edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderStyle {
    #[default]
    None,
    Hair,
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    DoubleLine,
}

impl BorderStyle {
    fn as_xml_attr(&self) -> Option<&'static str> {
        match self {
            BorderStyle::None => None,
            BorderStyle::Hair => Some("hair"),
            BorderStyle::Thin => Some("thin"),
            BorderStyle::Medium => Some("medium"),
            BorderStyle::Thick => Some("thick"),
            BorderStyle::Dashed => Some("dashed"),
            BorderStyle::Dotted => Some("dotted"),
            BorderStyle::DoubleLine => Some("double"),
        }
    }
}

/// Border part of a style definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Border {
    pub left: BorderStyle,
    pub right: BorderStyle,
    pub top: BorderStyle,
    pub bottom: BorderStyle,
    pub color: Option<Color>,
}

impl Border {
    fn push_side(&self, out: &mut Vec<u8>, tag: &str, style: BorderStyle) {
        match style.as_xml_attr() {
            None => {
                out.push(b'<');
                out.extend_from_slice(tag.as_bytes());
                out.extend_from_slice(b"/>");
            }
            Some(name) => {
                out.push(b'<');
                out.extend_from_slice(tag.as_bytes());
                out.extend_from_slice(b" style=\"");
                out.extend_from_slice(name.as_bytes());
                out.push(b'"');
                match &self.color {
                    Some(color) => {
                        out.extend_from_slice(b"><color rgb=\"");
                        color.push_argb(out);
                        out.extend_from_slice(b"\"/></");
                        out.extend_from_slice(tag.as_bytes());
                        out.push(b'>');
                    }
                    None => out.extend_from_slice(b"/>"),
                }
            }
        }
    }

    fn push_xml(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<border>");
        self.push_side(out, "left", self.left);
        self.push_side(out, "right", self.right);
        self.push_side(out, "top", self.top);
        self.push_side(out, "bottom", self.bottom);
        out.extend_from_slice(b"<diagonal/></border>");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HorizontalAlignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerticalAlignment {
    #[default]
    Bottom,
    Center,
    Top,
}

/// Alignment part of a style definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Alignment {
    pub horizontal: HorizontalAlignment,
    pub vertical: VerticalAlignment,
    pub wrap_text: bool,
    pub indent: u32,
}

impl Alignment {
    fn push_xml(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<alignment");
        match self.horizontal {
            HorizontalAlignment::None => {}
            HorizontalAlignment::Left => out.extend_from_slice(b" horizontal=\"left\""),
            HorizontalAlignment::Center => out.extend_from_slice(b" horizontal=\"center\""),
            HorizontalAlignment::Right => out.extend_from_slice(b" horizontal=\"right\""),
        }
        match self.vertical {
            VerticalAlignment::Bottom => {}
            VerticalAlignment::Center => out.extend_from_slice(b" vertical=\"center\""),
            VerticalAlignment::Top => out.extend_from_slice(b" vertical=\"top\""),
        }
        if self.wrap_text {
            out.extend_from_slice(b" wrapText=\"1\"");
        }
        if self.indent > 0 {
            out.extend_from_slice(b" indent=\"");
            let mut num = itoa::Buffer::new();
            out.extend_from_slice(num.format(self.indent).as_bytes());
            out.push(b'"');
        }
        out.extend_from_slice(b"/>");
    }
}

/// A predefined number format from the XLSX specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardNumberFormat {
    General = 0,
    Integer = 1,
    TwoDecimalPlaces = 2,
    ThousandsSeparator = 3,
    ThousandsSeparatorTwoDecimalPlaces = 4,
    Percent = 9,
    PercentTwoDecimalPlaces = 10,
    Scientific = 11,
    Fraction = 12,
    ShortDate = 14,
    LongTime = 21,
    DateAndTime = 22,
    Text = 49,
}

/// Format that defines how a numeric or date-time cell is displayed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NumberFormat {
    Standard(StandardNumberFormat),
    Custom(String),
}

impl NumberFormat {
    /// A custom format using an Excel format code, e.g. `"#,##0.00"`
    pub fn custom(format: impl Into<String>) -> Self {
        NumberFormat::Custom(format.into())
    }

    pub fn standard(format: StandardNumberFormat) -> Self {
        NumberFormat::Standard(format)
    }
}

/// Matches custom format strings that are spelled exactly like a predefined
/// format, so they reuse the predefined id instead of a custom one.
fn predefined_format_id(format: &str) -> Option<u16> {
    let id = match format {
        "General" => 0,
        "0" => 1,
        "0.00" => 2,
        "#,##0" => 3,
        "#,##0.00" => 4,
        "0%" => 9,
        "0.00%" => 10,
        "0.00E+00" => 11,
        "# ?/?" => 12,
        "mm-dd-yy" => 14,
        "h:mm:ss" => 21,
        "m/d/yy h:mm" => 22,
        "@" => 49,
        _ => return None,
    };
    Some(id)
}

/// An immutable style definition: the combination a style handle denotes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub number_format: Option<NumberFormat>,
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    pub alignment: Alignment,
}

/// Whether a named style shows up in the spreadsheet application's style
/// gallery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleNameVisibility {
    Visible,
    Hidden,
}

/// Opaque handle to a registered style.
///
/// Only produced by style registration; two equal style definitions resolve
/// to the same handle. `date_time_index` points at the variant of the same
/// style that has the workbook's default date-time format applied, used when
/// a date-time cell carries a style without an explicit number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleId {
    pub(crate) index: u32,
    pub(crate) date_time_index: u32,
}

struct NamedStyle {
    id: StyleId,
    visibility: Option<StyleNameVisibility>,
}

/// Deduplicating style table with the mandatory default entry at index 0
pub(crate) struct StyleRegistry {
    styles: IndexSet<Style>,
    named: IndexMap<String, NamedStyle>,
    default_date_time_format: Option<NumberFormat>,
    default_date_time_style: Option<StyleId>,
}

impl StyleRegistry {
    pub(crate) fn new(default_date_time_format: Option<NumberFormat>) -> Self {
        let mut styles = IndexSet::new();
        styles.insert(Style::default());

        let mut registry = StyleRegistry {
            styles,
            named: IndexMap::new(),
            default_date_time_format,
            default_date_time_style: None,
        };

        if registry.default_date_time_format.is_some() {
            let id = registry.add(&Style::default());
            registry.default_date_time_style = Some(id);
        }
        registry
    }

    /// Register a style, reusing the index of an equal definition
    pub(crate) fn add(&mut self, style: &Style) -> StyleId {
        let index = self.insert(style);

        let date_time_index = match (&style.number_format, &self.default_date_time_format) {
            (None, Some(format)) => {
                let mut with_format = style.clone();
                with_format.number_format = Some(format.clone());
                self.insert(&with_format)
            }
            _ => index,
        };

        StyleId {
            index,
            date_time_index,
        }
    }

    fn insert(&mut self, style: &Style) -> u32 {
        if let Some(index) = self.styles.get_index_of(style) {
            return index as u32;
        }
        let (index, _) = self.styles.insert_full(style.clone());
        index as u32
    }

    /// Register a style under a unique name for later lookup
    pub(crate) fn add_named(
        &mut self,
        name: &str,
        style: &Style,
        visibility: Option<StyleNameVisibility>,
    ) -> Result<StyleId> {
        let invalid = |reason| SheetError::InvalidStyleName {
            name: name.to_string(),
            reason,
        };
        if name.trim().is_empty() {
            return Err(invalid("name must not be empty or whitespace"));
        }
        if name.len() > MAX_STYLE_NAME_LENGTH {
            return Err(invalid("name must be at most 255 characters"));
        }
        if name.starts_with(char::is_whitespace) || name.ends_with(char::is_whitespace) {
            return Err(invalid("name must not start or end with whitespace"));
        }
        if name.eq_ignore_ascii_case("Normal") {
            return Err(invalid("'Normal' is reserved for the default style"));
        }
        if self.named.contains_key(name) {
            return Err(SheetError::DuplicateStyleName(name.to_string()));
        }

        let id = self.add(style);
        self.named
            .insert(name.to_string(), NamedStyle { id, visibility });
        Ok(id)
    }

    pub(crate) fn get_named(&self, name: &str) -> Result<StyleId> {
        self.named
            .get(name)
            .map(|named| named.id)
            .ok_or_else(|| SheetError::StyleNameNotFound(name.to_string()))
    }

    pub(crate) fn default_date_time_style(&self) -> Option<StyleId> {
        self.default_date_time_style
    }

    /// True once the table holds anything beyond the bare default, which is
    /// when a styles part has to be written at all.
    pub(crate) fn is_active(&self) -> bool {
        self.styles.len() > 1 || !self.named.is_empty()
    }
}

/// Streams `xl/styles.xml` into the open archive entry.
///
/// Fonts, fills, borders and custom number formats are collapsed into their
/// own zero-based index spaces here; the `<xf>` records then reference those
/// indices. Emission order follows the schema: numFmts, fonts, fills,
/// borders, cellStyleXfs, cellXfs, cellStyles.
pub(crate) fn write_styles_xml<W: Write>(
    registry: &StyleRegistry,
    buffer: &mut SpreadsheetBuffer,
    zip: &mut StreamingZipWriter<W>,
) -> Result<()> {
    let styles = &registry.styles;

    // Custom number formats, first-seen order, ids from 165
    let mut custom_formats: IndexMap<&str, u16> = IndexMap::new();
    for style in styles {
        if let Some(NumberFormat::Custom(format)) = &style.number_format {
            if predefined_format_id(format).is_none() && !custom_formats.contains_key(format.as_str()) {
                let id = CUSTOM_NUMBER_FORMAT_BASE + custom_formats.len() as u16;
                custom_formats.insert(format, id);
            }
        }
    }

    let default_font = Font::default();
    let default_border = Border::default();

    // Fonts: index 0 reserved for the default font
    let mut fonts: IndexMap<&Font, usize> = IndexMap::new();
    fonts.insert(&default_font, 0);
    for style in styles {
        let next = fonts.len();
        fonts.entry(&style.font).or_insert(next);
    }

    // Fills: indices 0 and 1 are the mandatory "none" and "gray125" built-ins
    let mut fills: IndexMap<&Fill, usize> = IndexMap::new();
    fills.insert(&Fill::None, 0);
    for style in styles {
        let next = fills.len() + 1;
        fills.entry(&style.fill).or_insert(next);
    }

    // Borders: index 0 reserved for the empty border
    let mut borders: IndexMap<&Border, usize> = IndexMap::new();
    borders.insert(&default_border, 0);
    for style in styles {
        let next = borders.len();
        borders.entry(&style.border).or_insert(next);
    }

    let mut out = Vec::with_capacity(1024);
    let mut num = itoa::Buffer::new();

    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
    out.extend_from_slice(
        b"<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
    );

    if !custom_formats.is_empty() {
        out.extend_from_slice(b"<numFmts count=\"");
        out.extend_from_slice(num.format(custom_formats.len()).as_bytes());
        out.extend_from_slice(b"\">");
        for (format, id) in &custom_formats {
            out.extend_from_slice(b"<numFmt numFmtId=\"");
            out.extend_from_slice(num.format(*id).as_bytes());
            out.extend_from_slice(b"\" formatCode=\"");
            push_escaped(&mut out, format);
            out.extend_from_slice(b"\"/>");
        }
        out.extend_from_slice(b"</numFmts>");
    }
    buffer.write_all_chunked(&out, zip)?;
    out.clear();

    out.extend_from_slice(b"<fonts count=\"");
    out.extend_from_slice(num.format(fonts.len()).as_bytes());
    out.extend_from_slice(b"\">");
    buffer.write_all_chunked(&out, zip)?;
    for font in fonts.keys() {
        out.clear();
        font.push_xml(&mut out);
        buffer.write_all_chunked(&out, zip)?;
    }
    out.clear();

    out.extend_from_slice(b"</fonts><fills count=\"");
    out.extend_from_slice(num.format(fills.len() + 1).as_bytes());
    out.extend_from_slice(b"\">");
    out.extend_from_slice(b"<fill><patternFill patternType=\"none\"/></fill>");
    out.extend_from_slice(b"<fill><patternFill patternType=\"gray125\"/></fill>");
    buffer.write_all_chunked(&out, zip)?;
    for fill in fills.keys().skip(1) {
        out.clear();
        fill.push_xml(&mut out);
        buffer.write_all_chunked(&out, zip)?;
    }
    out.clear();

    out.extend_from_slice(b"</fills><borders count=\"");
    out.extend_from_slice(num.format(borders.len()).as_bytes());
    out.extend_from_slice(b"\">");
    buffer.write_all_chunked(&out, zip)?;
    for border in borders.keys() {
        out.clear();
        border.push_xml(&mut out);
        buffer.write_all_chunked(&out, zip)?;
    }
    out.clear();

    // Named styles with visibility get a cellStyleXfs entry each, referenced
    // from both their cellXfs record and their cellStyles entry.
    let visible_named: Vec<(&String, &NamedStyle)> = registry
        .named
        .iter()
        .filter(|(_, named)| named.visibility.is_some())
        .collect();
    let mut style_xf_ids: Vec<usize> = vec![0; styles.len()];
    for (slot, (_, named)) in visible_named.iter().enumerate() {
        style_xf_ids[named.id.index as usize] = slot + 1;
    }

    out.extend_from_slice(b"</borders><cellStyleXfs count=\"");
    out.extend_from_slice(num.format(visible_named.len() + 1).as_bytes());
    out.extend_from_slice(b"\"><xf numFmtId=\"0\" fontId=\"0\"/>");
    for (_, named) in &visible_named {
        let style = &styles[named.id.index as usize];
        push_xf(&mut out, style, &custom_formats, &fonts, &fills, &borders, None);
    }
    out.extend_from_slice(b"</cellStyleXfs><cellXfs count=\"");
    out.extend_from_slice(num.format(styles.len()).as_bytes());
    out.extend_from_slice(b"\">");
    buffer.write_all_chunked(&out, zip)?;

    for (index, style) in styles.iter().enumerate() {
        out.clear();
        push_xf(
            &mut out,
            style,
            &custom_formats,
            &fonts,
            &fills,
            &borders,
            Some(style_xf_ids[index]),
        );
        buffer.write_all_chunked(&out, zip)?;
    }
    out.clear();

    out.extend_from_slice(b"</cellXfs><cellStyles count=\"");
    out.extend_from_slice(num.format(visible_named.len() + 1).as_bytes());
    out.extend_from_slice(b"\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/>");
    for (slot, (name, named)) in visible_named.iter().enumerate() {
        out.extend_from_slice(b"<cellStyle name=\"");
        push_escaped(&mut out, name);
        out.extend_from_slice(b"\" xfId=\"");
        out.extend_from_slice(num.format(slot + 1).as_bytes());
        out.push(b'"');
        if matches!(named.visibility, Some(StyleNameVisibility::Hidden)) {
            out.extend_from_slice(b" hidden=\"1\"");
        }
        out.extend_from_slice(b"/>");
    }
    out.extend_from_slice(b"</cellStyles><dxfs count=\"0\"/></styleSheet>");
    buffer.write_all_chunked(&out, zip)?;
    buffer.flush_to(zip)?;
    Ok(())
}

fn number_format_id(
    format: &Option<NumberFormat>,
    custom_formats: &IndexMap<&str, u16>,
) -> u16 {
    match format {
        None => 0,
        Some(NumberFormat::Standard(standard)) => *standard as u16,
        Some(NumberFormat::Custom(custom)) => predefined_format_id(custom)
            .or_else(|| custom_formats.get(custom.as_str()).copied())
            .unwrap_or(0),
    }
}

fn push_xf(
    out: &mut Vec<u8>,
    style: &Style,
    custom_formats: &IndexMap<&str, u16>,
    fonts: &IndexMap<&Font, usize>,
    fills: &IndexMap<&Fill, usize>,
    borders: &IndexMap<&Border, usize>,
    xf_id: Option<usize>,
) {
    let mut num = itoa::Buffer::new();

    let format_id = number_format_id(&style.number_format, custom_formats);
    out.extend_from_slice(b"<xf numFmtId=\"");
    out.extend_from_slice(num.format(format_id).as_bytes());
    out.push(b'"');
    if format_id > 0 {
        out.extend_from_slice(b" applyNumberFormat=\"1\"");
    }

    let font_index = fonts[&style.font];
    out.extend_from_slice(b" fontId=\"");
    out.extend_from_slice(num.format(font_index).as_bytes());
    out.push(b'"');
    if font_index > 0 {
        out.extend_from_slice(b" applyFont=\"1\"");
    }

    let fill_index = fills[&style.fill];
    out.extend_from_slice(b" fillId=\"");
    out.extend_from_slice(num.format(fill_index).as_bytes());
    out.push(b'"');
    if fill_index > 1 {
        out.extend_from_slice(b" applyFill=\"1\"");
    }

    let border_index = borders[&style.border];
    if border_index > 0 {
        out.extend_from_slice(b" borderId=\"");
        out.extend_from_slice(num.format(border_index).as_bytes());
        out.extend_from_slice(b"\" applyBorder=\"1\"");
    }

    if let Some(xf_id) = xf_id {
        out.extend_from_slice(b" xfId=\"");
        out.extend_from_slice(num.format(xf_id).as_bytes());
        out.push(b'"');
    }

    if style.alignment == Alignment::default() {
        out.extend_from_slice(b"/>");
    } else {
        out.extend_from_slice(b" applyAlignment=\"1\">");
        style.alignment.push_xml(out);
        out.extend_from_slice(b"</xf>");
    }
}

/// XML-escape `text` into `out`
pub(crate) fn push_escaped(out: &mut Vec<u8>, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\'' => out.extend_from_slice(b"&apos;"),
            _ => {
                let mut utf8 = [0; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
}
