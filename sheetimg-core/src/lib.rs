//! sheetimg-core: in-cell images for xlsx packages
//!
//! Embeds pictures into worksheet cells the way WPS-compatible spreadsheet
//! applications expect them: a descriptor in `xl/cellimages.xml`, the image
//! under `xl/media`, and a `DISPIMG` formula in the cell. Every part that has
//! to agree on IDs and paths is kept consistent by the registrars.

pub mod cell_ref;
pub mod config;
pub mod embed;
pub mod error;
pub mod media;
pub mod package;
pub mod registrar;
pub mod source;
pub mod worksheet;
pub mod xml;

use std::path::Path;

pub use cell_ref::CellReference;
pub use config::{CellAddressing, EmbedConfig};
pub use embed::{EmbedOutcome, EmbedReport, EmbedRequest, SkipReason, embed_images};
pub use error::{EmbedError, Result};
pub use package::Package;
pub use source::{DimensionProber, ExplicitPaths, HeaderColumn, ImageProber, ImageRow, RowSource};
pub use xml::PartTemplates;

/// Main embedding interface
pub struct Embedder {
    config: EmbedConfig,
    prober: Box<dyn DimensionProber>,
    dry_run: bool,
}

impl Embedder {
    /// Create an embedder with the default configuration
    pub fn new() -> Self {
        Self::with_config(EmbedConfig::default())
    }

    pub fn with_config(config: EmbedConfig) -> Self {
        Self {
            config,
            prober: Box::new(ImageProber),
            dry_run: false,
        }
    }

    /// Replace the image dimension prober
    pub fn with_prober(mut self, prober: Box<dyn DimensionProber>) -> Self {
        self.prober = prober;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Embed the images listed under `header` in `sheet` of `input`
    pub fn embed_column<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        sheet: &str,
        header: &str,
    ) -> Result<EmbedReport> {
        let input = input.as_ref();
        let rows = HeaderColumn::new(input, sheet, header);
        self.embed_rows(input, output.as_ref(), sheet, &rows)
    }

    /// Embed `paths` into `column`, one per data row
    pub fn embed_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        sheet: &str,
        column: u32,
        paths: &[String],
    ) -> Result<EmbedReport> {
        let rows = ExplicitPaths::new(column, paths.iter().cloned());
        self.embed_rows(input.as_ref(), output.as_ref(), sheet, &rows)
    }

    /// Embed the rows of any source
    pub fn embed_rows(
        &self,
        input: &Path,
        output: &Path,
        sheet: &str,
        rows: &dyn RowSource,
    ) -> Result<EmbedReport> {
        let mut request = EmbedRequest::new(input, output, sheet).with_config(self.config.clone());
        request.dry_run = self.dry_run;
        embed_images(&request, rows, self.prober.as_ref())
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new()
    }
}
