//! Unpacked spreadsheet packages
//!
//! A [`Package`] is the working directory an xlsx archive was extracted to.
//! Parts are opened, edited and written back one at a time; nothing is
//! cached between operations.

pub mod paths;

pub use paths::PartName;

use crate::error::{EmbedError, Result};
use crate::xml::{PartTemplates, XmlPart};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// An unpacked package rooted at a working directory
#[derive(Debug)]
pub struct Package {
    root: PathBuf,
    templates: PartTemplates,
    /// Remove `root` when dropped
    owns_root: bool,
}

impl Package {
    /// Extract `archive_path` into `work_dir`.
    ///
    /// `work_dir` must be absent or empty; existing content is never touched.
    /// The directory is removed again when the returned package is dropped,
    /// unless [`Package::keep`] is called.
    pub fn unpack(archive_path: &Path, work_dir: &Path, templates: PartTemplates) -> Result<Self> {
        let file = File::open(archive_path).map_err(|e| EmbedError::io(archive_path, e))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|source| EmbedError::PackageUnreadable {
                path: archive_path.to_path_buf(),
                source,
            })?;

        if !is_empty_or_absent(work_dir)? {
            return Err(EmbedError::Config(format!(
                "working directory {} already exists and is not empty",
                work_dir.display()
            )));
        }
        fs::create_dir_all(work_dir).map_err(|e| EmbedError::io(work_dir, e))?;

        // From here on the directory exists, so failures must still clean it up
        let package = Self {
            root: work_dir.to_path_buf(),
            templates,
            owns_root: true,
        };
        archive
            .extract(&package.root)
            .map_err(|source| EmbedError::PackageUnreadable {
                path: archive_path.to_path_buf(),
                source,
            })?;
        debug!(
            "Extracted {} ({} entries) to {}",
            archive_path.display(),
            archive.len(),
            work_dir.display()
        );
        Ok(package)
    }

    /// Use an already unpacked directory. The directory is left in place on drop.
    pub fn from_dir(root: impl Into<PathBuf>, templates: PartTemplates) -> Self {
        Self {
            root: root.into(),
            templates,
            owns_root: false,
        }
    }

    /// Leave the working directory on disk when this package is dropped
    pub fn keep(&mut self) {
        self.owns_root = false;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates(&self) -> &PartTemplates {
        &self.templates
    }

    /// On-disk path of a zip entry name
    pub fn entry_path(&self, entry: &str) -> PathBuf {
        entry
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    pub fn part_path(&self, part: &PartName) -> PathBuf {
        self.entry_path(&part.entry_name())
    }

    pub fn has_part(&self, part: &PartName) -> bool {
        self.part_path(part).is_file()
    }

    /// Write `template` to `part` if and only if the part does not exist yet.
    ///
    /// Returns `true` when the part was created.
    pub fn ensure_exists(&self, part: &PartName, template: &str) -> Result<bool> {
        let path = self.part_path(part);
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EmbedError::io(parent, e))?;
        }
        fs::write(&path, template).map_err(|e| EmbedError::io(&path, e))?;
        debug!("Seeded {} from template", part);
        Ok(true)
    }

    /// Read and parse a part
    pub fn open(&self, part: &PartName) -> Result<XmlPart> {
        let path = self.part_path(part);
        let bytes = fs::read(&path).map_err(|e| EmbedError::io(&path, e))?;
        let xml = String::from_utf8_lossy(&bytes);
        // A UTF-8 byte order mark is legal at the start of a part
        let xml = xml.trim_start_matches('\u{feff}');
        XmlPart::parse(xml, &part.entry_name())
    }

    /// Serialize a part over its file
    pub fn write(&self, part: &PartName, xml: &XmlPart) -> Result<()> {
        let path = self.part_path(part);
        let content = xml.to_xml()?;
        fs::write(&path, content).map_err(|e| EmbedError::io(&path, e))?;
        debug!("Wrote {}", part);
        Ok(())
    }

    /// Compress the working directory into `output_path`.
    ///
    /// `[Content_Types].xml` is written first; the remaining entries follow in
    /// sorted order. A partially written archive is removed on failure.
    pub fn pack(&self, output_path: &Path) -> Result<()> {
        let result = self.write_archive(output_path);
        if result.is_err() && output_path.exists() {
            if let Err(e) = fs::remove_file(output_path) {
                warn!("Failed to remove partial archive {}: {}", output_path.display(), e);
            }
        }
        result
    }

    fn write_archive(&self, output_path: &Path) -> Result<()> {
        let mut entries = self.entries()?;
        entries.sort_by(|(a, _), (b, _)| {
            let a_first = a == "[Content_Types].xml";
            let b_first = b == "[Content_Types].xml";
            b_first.cmp(&a_first).then_with(|| a.cmp(b))
        });

        let file = File::create(output_path).map_err(|e| EmbedError::io(output_path, e))?;
        let mut zip_writer = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let zip_err = |source| EmbedError::PackageWrite {
            path: output_path.to_path_buf(),
            source,
        };

        for (name, path) in &entries {
            let content = fs::read(path).map_err(|e| EmbedError::io(path, e))?;
            zip_writer
                .start_file(name.clone(), options)
                .map_err(zip_err)?;
            zip_writer
                .write_all(&content)
                .map_err(|e| EmbedError::io(output_path, e))?;
        }

        let mut inner = zip_writer.finish().map_err(zip_err)?;
        inner.flush().map_err(|e| EmbedError::io(output_path, e))?;
        debug!(
            "Compressed {} ({} entries) to {}",
            self.root.display(),
            entries.len(),
            output_path.display()
        );
        Ok(())
    }

    /// Every file below the root as `(entry name, path)`
    fn entries(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                EmbedError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push((name, entry.path().to_path_buf()));
        }
        Ok(entries)
    }
}

fn is_empty_or_absent(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    let mut entries = fs::read_dir(dir).map_err(|e| EmbedError::io(dir, e))?;
    Ok(entries.next().is_none())
}

impl Drop for Package {
    fn drop(&mut self) {
        if !self.owns_root || !self.root.exists() {
            return;
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed working directory {}", self.root.display()),
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                self.root.display(),
                e
            ),
        }
    }
}
