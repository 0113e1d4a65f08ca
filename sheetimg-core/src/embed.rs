//! The embed run: unpack, register, patch, pack
//!
//! Part-level edits happen in a fixed order so that the package is always in
//! a state the next step understands:
//!
//! 1. the archive is unpacked, then the rows are read and every source measured;
//! 2. content types (for the measured images only) and the workbook link are
//!    ensured once per run;
//! 3. per image the file is copied, registered in `cellimages.xml`, bound in
//!    its relationship table and finally referenced from the cell;
//! 4. the working directory is packed into the output archive and removed.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::media::copy_to_media;
use crate::package::Package;
use crate::registrar::{
    RegisteredImage, ensure_image_content_types, ensure_workbook_links_cell_images,
    register_image, register_image_relationship,
};
use crate::source::{DimensionProber, ImageRow, RowSource};
use crate::worksheet::{locate_cell, resolve_worksheet, set_cell_image_reference};
use crate::xml::PartTemplates;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything an embed run needs besides the rows themselves
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Worksheet name as shown on its tab
    pub sheet: String,
    pub config: EmbedConfig,
    pub templates: PartTemplates,
    /// Run every edit but do not write the output archive
    pub dry_run: bool,
}

impl EmbedRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, sheet: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            sheet: sheet.into(),
            config: EmbedConfig::default(),
            templates: PartTemplates::default(),
            dry_run: false,
        }
    }

    pub fn with_config(mut self, config: EmbedConfig) -> Self {
        self.config = config;
        self
    }

    /// Fresh directory for this run, inside `config.work_dir` or next to the input
    fn work_dir(&self) -> PathBuf {
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());
        let name = format!("{}_sheetimg_{}", stem, Uuid::new_v4().simple());
        match &self.config.work_dir {
            Some(parent) => parent.join(name),
            None => self.input.with_file_name(name),
        }
    }
}

/// Why a row produced no image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    EmptyPath,
    NotFound,
    Undecodable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::EmptyPath => write!(f, "no image path"),
            SkipReason::NotFound => write!(f, "file not found"),
            SkipReason::Undecodable(msg) => write!(f, "not a readable image: {}", msg),
        }
    }
}

/// Result for one source row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmbedOutcome {
    Embedded {
        row: u32,
        column: u32,
        /// A1 address of the patched cell
        cell: String,
        source: String,
        /// File name under `xl/media`
        media_name: String,
        image: RegisteredImage,
    },
    Skipped {
        row: u32,
        source: String,
        reason: SkipReason,
    },
}

/// Summary of an embed run
#[derive(Debug, Clone, Serialize)]
pub struct EmbedReport {
    /// Written archive; `None` for dry runs
    pub output: Option<PathBuf>,
    /// Worksheet part that was patched
    pub worksheet: String,
    /// Working directory, when it was kept
    pub work_dir: Option<PathBuf>,
    pub outcomes: Vec<EmbedOutcome>,
}

impl EmbedReport {
    pub fn embedded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, EmbedOutcome::Embedded { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.embedded_count()
    }

    pub fn embedded(&self) -> impl Iterator<Item = &EmbedOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, EmbedOutcome::Embedded { .. }))
    }
}

/// Embed every image `rows` yields into `request.sheet` of `request.input`.
///
/// Missing, empty or undecodable sources are skipped. Any other failure ends
/// the run without writing an output; the working directory is removed on
/// every path unless `keep_work_dir` is set.
pub fn embed_images(
    request: &EmbedRequest,
    rows: &dyn RowSource,
    prober: &dyn DimensionProber,
) -> Result<EmbedReport> {
    request.config.validate()?;

    let work_dir = request.work_dir();
    let mut package = Package::unpack(&request.input, &work_dir, request.templates.clone())?;
    if request.config.keep_work_dir {
        package.keep();
    }

    let rows = rows.rows()?;
    debug!("{} candidate rows for {}", rows.len(), request.sheet);
    let worksheet = resolve_worksheet(&package, &request.sheet)?;

    // Measure every source before anything is written; a skipped row leaves no trace
    let sizes: Vec<std::result::Result<(u32, u32), SkipReason>> =
        rows.iter().map(|r| measure(prober, &r.source)).collect();

    let embeddable = rows
        .iter()
        .zip(&sizes)
        .filter(|(_, size)| size.is_ok())
        .map(|(r, _)| Path::new(&r.source));
    let extensions = extensions_to_declare(&request.config.extensions, embeddable);
    let added = ensure_image_content_types(&package, &extensions, &request.config)?;
    debug!("Declared {} new content types", added);
    ensure_workbook_links_cell_images(&package)?;

    let addressing = request.config.addressing;
    let mut outcomes = Vec::with_capacity(rows.len());
    for (image_row, size) in rows.iter().zip(sizes) {
        let ImageRow { row, column, source } = image_row;
        let (width, height) = match size {
            Ok(size) => size,
            Err(reason) => {
                warn!("Skipping row {} ({}): {}", row, source, reason);
                outcomes.push(EmbedOutcome::Skipped {
                    row: *row,
                    source: source.clone(),
                    reason,
                });
                continue;
            }
        };
        let source_path = Path::new(source);

        // Fail before any part is touched for this image
        let cell = locate_cell(&package, &worksheet, *row, *column, addressing)?;

        let media = copy_to_media(&package, source_path)?;
        let label = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| media.file_name.clone());
        let image = register_image(&package, width, height, &label)?;
        register_image_relationship(&package, &image.relationship_id, &media.file_name)?;
        set_cell_image_reference(&package, &worksheet, *row, *column, &image.image_id, addressing)?;

        info!(
            "Embedded {} into {} as {} ({}x{})",
            source, cell, image.image_id, width, height
        );
        outcomes.push(EmbedOutcome::Embedded {
            row: *row,
            column: *column,
            cell,
            source: source.clone(),
            media_name: media.file_name,
            image,
        });
    }

    let output = if request.dry_run {
        info!("Dry run, not writing {}", request.output.display());
        None
    } else {
        package.pack(&request.output)?;
        info!("Wrote {}", request.output.display());
        Some(request.output.clone())
    };

    let report = EmbedReport {
        output,
        worksheet: worksheet.to_string(),
        work_dir: request.config.keep_work_dir.then(|| package.root().to_path_buf()),
        outcomes,
    };
    drop(package);
    Ok(report)
}

/// Pixel size of `source`, or why it will be skipped
fn measure(prober: &dyn DimensionProber, source: &str) -> std::result::Result<(u32, u32), SkipReason> {
    if source.is_empty() {
        return Err(SkipReason::EmptyPath);
    }
    let path = Path::new(source);
    if !path.is_file() {
        return Err(SkipReason::NotFound);
    }
    prober.dimensions(path).map_err(|e| {
        let detail = match e {
            EmbedError::ImageProbe { source: cause, .. } => cause.to_string(),
            other => other.to_string(),
        };
        SkipReason::Undecodable(detail)
    })
}

/// Configured extensions followed by those of the sources that will be embedded
fn extensions_to_declare<'a>(
    configured: &[String],
    sources: impl Iterator<Item = &'a Path>,
) -> Vec<String> {
    let mut extensions: Vec<String> = Vec::new();
    let from_sources = sources
        .filter_map(|p| p.extension())
        .map(|e| e.to_string_lossy().into_owned());
    for extension in configured.iter().cloned().chain(from_sources) {
        if !extension.is_empty() && !extensions.contains(&extension) {
            extensions.push(extension);
        }
    }
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_extensions_keep_order_and_dedupe() {
        let sources = [
            Path::new("/pics/a.png"),
            Path::new("/pics/noext"),
            Path::new("/pics/b.GIF"),
            Path::new("/pics/c.png"),
        ];
        let configured = vec!["jpeg".to_string(), "JPG".to_string()];
        assert_eq!(
            extensions_to_declare(&configured, sources.into_iter()),
            vec!["jpeg", "JPG", "png", "GIF"]
        );
    }

    struct FixedSize;

    impl DimensionProber for FixedSize {
        fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
            if path.extension().is_some_and(|e| e == "png") {
                Ok((4, 3))
            } else {
                Err(EmbedError::Config("unsupported".into()))
            }
        }
    }

    #[test]
    fn test_skip_reasons_are_decided_before_copy() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("a.png");
        let txt = dir.path().join("notes.txt");
        fs::write(&png, b"x").unwrap();
        fs::write(&txt, b"x").unwrap();

        assert_eq!(measure(&FixedSize, ""), Err(SkipReason::EmptyPath));
        assert_eq!(measure(&FixedSize, "/does/not/exist.png"), Err(SkipReason::NotFound));
        assert_eq!(measure(&FixedSize, &png.to_string_lossy()), Ok((4, 3)));
        assert!(matches!(
            measure(&FixedSize, &txt.to_string_lossy()),
            Err(SkipReason::Undecodable(_))
        ));
    }

    #[test]
    fn test_default_work_dir_is_unique_sibling() {
        let request = EmbedRequest::new("/data/in.xlsx", "/data/out.xlsx", "Sheet1");
        let a = request.work_dir();
        let b = request.work_dir();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/data")));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("in_sheetimg_"));
    }

    #[test]
    fn test_configured_work_dir_is_the_parent() {
        let config = EmbedConfig {
            work_dir: Some(PathBuf::from("/tmp/unpacked")),
            ..EmbedConfig::default()
        };
        let request = EmbedRequest::new("in.xlsx", "out.xlsx", "Sheet1").with_config(config);
        let a = request.work_dir();
        let b = request.work_dir();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/tmp/unpacked")));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("in_sheetimg_"));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::EmptyPath.to_string(), "no image path");
        assert_eq!(SkipReason::NotFound.to_string(), "file not found");
    }
}
