//! Where the images come from: row sources and dimension probing

use crate::error::{EmbedError, Result};
use calamine::{Data, Reader, Sheets, open_workbook_auto};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One image to place: zero-based target row and column plus the source path.
///
/// An empty `source` is kept so the row still shows up as skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRow {
    pub row: u32,
    pub column: u32,
    pub source: String,
}

/// Produces the `(row, column, source)` triples for one run
pub trait RowSource {
    fn rows(&self) -> Result<Vec<ImageRow>>;
}

/// Image paths read from the column under `header` in a worksheet.
///
/// The first row of the used range is the header row; data row `i` maps to
/// worksheet row `start + 1 + i`.
#[derive(Debug, Clone)]
pub struct HeaderColumn {
    pub workbook: PathBuf,
    pub sheet: String,
    pub header: String,
}

impl HeaderColumn {
    pub fn new(workbook: impl Into<PathBuf>, sheet: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            workbook: workbook.into(),
            sheet: sheet.into(),
            header: header.into(),
        }
    }
}

impl RowSource for HeaderColumn {
    fn rows(&self) -> Result<Vec<ImageRow>> {
        let mut excel: Sheets<_> = open_workbook_auto(&self.workbook)?;
        if !excel.sheet_names().iter().any(|name| *name == self.sheet) {
            return Err(EmbedError::SheetNotFound(self.sheet.clone()));
        }
        let range = excel.worksheet_range(&self.sheet)?;

        let column_not_found = || EmbedError::ColumnNotFound {
            sheet: self.sheet.clone(),
            header: self.header.clone(),
        };
        let (start_row, start_col) = range.start().ok_or_else(column_not_found)?;
        let mut rows = range.rows();
        let header_row = rows.next().ok_or_else(column_not_found)?;
        let header_index = header_row
            .iter()
            .position(|cell| cell_text(cell).trim() == self.header)
            .ok_or_else(column_not_found)?;
        let column = start_col + header_index as u32;

        let images: Vec<ImageRow> = rows
            .enumerate()
            .map(|(i, row)| ImageRow {
                row: start_row + 1 + i as u32,
                column,
                source: row
                    .get(header_index)
                    .map(|cell| cell_text(cell).trim().to_string())
                    .unwrap_or_default(),
            })
            .collect();

        debug!(
            "Read {} rows from column '{}' of {} in {}",
            images.len(),
            self.header,
            self.sheet,
            self.workbook.display()
        );
        Ok(images)
    }
}

fn cell_text(data: &Data) -> String {
    match data {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// A caller-provided path list; path `i` goes to row `i + 1` of `column`
#[derive(Debug, Clone)]
pub struct ExplicitPaths {
    pub column: u32,
    pub paths: Vec<String>,
}

impl ExplicitPaths {
    pub fn new<S: Into<String>>(column: u32, paths: impl IntoIterator<Item = S>) -> Self {
        Self {
            column,
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl RowSource for ExplicitPaths {
    fn rows(&self) -> Result<Vec<ImageRow>> {
        Ok(self
            .paths
            .iter()
            .enumerate()
            .map(|(i, path)| ImageRow {
                row: i as u32 + 1,
                column: self.column,
                source: path.clone(),
            })
            .collect())
    }
}

/// Pixel size of an image file
pub trait DimensionProber {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;
}

/// Reads the size from the image header without decoding pixels
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageProber;

impl DimensionProber for ImageProber {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let (width, height) =
            image::image_dimensions(path).map_err(|source| EmbedError::ImageProbe {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Image dimensions of {}: {}x{}", path.display(), width, height);
        Ok((width, height))
    }
}
