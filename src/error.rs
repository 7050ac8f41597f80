//! Error types for sheetstream

use thiserror::Error;

/// Result type alias for sheetstream operations
pub type Result<T> = std::result::Result<T, SheetError>;

/// Main error type for all spreadsheet write operations
#[derive(Error, Debug)]
pub enum SheetError {
    /// Worksheet name does not satisfy the XLSX naming rules
    #[error("Invalid worksheet name '{name}': {reason}")]
    InvalidWorksheetName { name: String, reason: &'static str },

    /// A worksheet with the same name (case-insensitive) already exists
    #[error("Worksheet name '{0}' already exists in this workbook")]
    DuplicateWorksheetName(String),

    /// The workbook was finished without any worksheet
    #[error("A workbook must contain at least one worksheet")]
    NoWorksheets,

    /// Invalid A1-style cell reference or cell range
    #[error("Invalid cell reference '{reference}': {reason}")]
    InvalidCellReference {
        reference: String,
        reason: &'static str,
    },

    /// Style name does not satisfy the naming rules
    #[error("Invalid style name '{name}': {reason}")]
    InvalidStyleName { name: String, reason: &'static str },

    /// A style with the same name was already registered
    #[error("Style name '{0}' already exists in this workbook")]
    DuplicateStyleName(String),

    /// Lookup of a named style that was never registered
    #[error("Style name '{0}' not found")]
    StyleNameNotFound(String),

    /// Note text exceeds the maximum length
    #[error("Note text is {length} characters, maximum is {max}")]
    NoteTextTooLong { length: usize, max: usize },

    /// Worksheet reached the maximum number of data validations
    #[error("A worksheet can contain at most {0} data validations")]
    TooManyDataValidations(usize),

    /// Image data did not match any supported format signature
    #[error("Unsupported image data: {0}")]
    UnsupportedImage(&'static str),

    /// Images must be embedded before the first worksheet is started
    #[error("Images can only be embedded before starting the first worksheet")]
    ImageEmbeddedTooLate,

    /// Buffer size below the enforced minimum
    #[error("Buffer size {size} is below the minimum of {min} bytes")]
    BufferTooSmall { size: usize, min: usize },

    /// The cooperative cancellation token was triggered
    #[error("The write operation was cancelled")]
    Cancelled,

    /// IO error from the underlying sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
