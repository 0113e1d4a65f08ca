//! Error types for package editing

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors raised while editing a spreadsheet package.
///
/// Missing or undecodable source images are not errors: they are reported as
/// skipped rows in the [`EmbedReport`](crate::embed::EmbedReport).
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The input file is not a readable zip archive
    #[error("package {path} is not a readable archive")]
    PackageUnreadable {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Writing the output archive failed
    #[error("failed to write package {path}")]
    PackageWrite {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A part could not be parsed as XML
    #[error("part {part} is not well-formed XML")]
    MalformedPart {
        part: String,
        #[source]
        source: quick_xml::Error,
    },

    /// A part exists but lacks an element the operation relies on
    #[error("part {part} has no <{element}> element")]
    PartMissingRequiredStructure { part: String, element: &'static str },

    /// The requested row or cell does not exist in the worksheet
    #[error("{kind} {index} does not exist in worksheet {sheet}")]
    IndexOutOfRange {
        sheet: String,
        kind: &'static str,
        index: u32,
    },

    #[error("worksheet {0} not found in workbook")]
    SheetNotFound(String),

    #[error("column header {header} not found in worksheet {sheet}")]
    ColumnNotFound { sheet: String, header: String },

    /// Tabular extraction through calamine failed
    #[error("failed to read worksheet data")]
    Spreadsheet(#[from] calamine::Error),

    #[error("failed to probe image dimensions of {path}")]
    ImageProbe {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serializing a part failed
    #[error("failed to serialize XML: {0}")]
    XmlWrite(String),
}

impl EmbedError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EmbedError::Io {
            path: path.into(),
            source,
        }
    }
}
