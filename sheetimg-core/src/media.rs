//! Copying source images into `xl/media`

use crate::error::{EmbedError, Result};
use crate::package::Package;
use crate::package::paths::MEDIA_DIR;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A media entry in the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFile {
    /// File name under `xl/media`
    pub file_name: String,
    /// Location inside the working directory
    pub path: PathBuf,
}

/// Copy `source` into the package's media directory.
///
/// The basename is kept when it is free, or when the file already there has
/// the same bytes. A different file of the same name is never overwritten:
/// the copy gets `<stem>_<hash prefix>.<ext>` instead.
pub fn copy_to_media(package: &Package, source: &Path) -> Result<MediaFile> {
    let media_dir = package.entry_path(MEDIA_DIR);
    fs::create_dir_all(&media_dir).map_err(|e| EmbedError::io(&media_dir, e))?;

    let base_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            EmbedError::io(
                source,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

    let content = fs::read(source).map_err(|e| EmbedError::io(source, e))?;
    let digest = hex::encode(Sha256::digest(&content));

    let mut file_name = base_name.clone();
    let mut attempt = 0;
    loop {
        let destination = media_dir.join(&file_name);
        if !destination.exists() {
            fs::write(&destination, &content).map_err(|e| EmbedError::io(&destination, e))?;
            debug!("Copied {} to {}", source.display(), destination.display());
            return Ok(MediaFile {
                file_name,
                path: destination,
            });
        }
        let existing = fs::read(&destination).map_err(|e| EmbedError::io(&destination, e))?;
        if existing == content {
            debug!("Reusing identical media file {}", destination.display());
            return Ok(MediaFile {
                file_name,
                path: destination,
            });
        }
        attempt += 1;
        file_name = suffixed_name(&base_name, &digest, attempt);
        info!(
            "Media name {} already taken by different content, using {}",
            base_name, file_name
        );
    }
}

fn suffixed_name(base_name: &str, digest: &str, attempt: usize) -> String {
    let (stem, ext) = match base_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base_name, None),
    };
    // 8 hex chars first, then a counter if even that collides
    let suffix = if attempt == 1 {
        digest[..8].to_string()
    } else {
        format!("{}_{}", &digest[..8], attempt)
    };
    match ext {
        Some(ext) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{stem}_{suffix}"),
    }
}
