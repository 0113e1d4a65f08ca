//! `[Content_Types].xml` registration

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::package::paths::{
    CELL_IMAGES_CONTENT_TYPE, CELL_IMAGES_PART, CONTENT_TYPES_NS, content_type_part_name,
};
use crate::package::{Package, PartName};
use crate::xml::Element;
use tracing::debug;

/// Declare the image extensions and the `cellimages.xml` override.
///
/// Matching is exact on the `Extension` / `PartName` attribute, so `JPG` and
/// `jpg` are separate entries. Returns the number of entries added; the
/// manifest is only rewritten when that number is non-zero.
pub fn ensure_image_content_types<S: AsRef<str>>(
    package: &Package,
    extensions: &[S],
    config: &EmbedConfig,
) -> Result<usize> {
    let part = PartName::ContentTypes;
    let mut manifest = package.open(&part)?;
    if !manifest.root.is(CONTENT_TYPES_NS, "Types") {
        return Err(EmbedError::PartMissingRequiredStructure {
            part: part.to_string(),
            element: "Types",
        });
    }

    let mut added = 0;
    for extension in extensions {
        let extension = extension.as_ref();
        let declared = manifest
            .root
            .children_named(CONTENT_TYPES_NS, "Default")
            .any(|d| d.attribute("Extension") == Some(extension));
        if declared {
            continue;
        }
        let name = manifest.qualified(CONTENT_TYPES_NS, "", "Default");
        let content_type = config.content_type_for(extension);
        debug!("Declaring extension {} as {}", extension, content_type);
        manifest.root.push(
            Element::new(name, Some(CONTENT_TYPES_NS))
                .with_attr("Extension", extension)
                .with_attr("ContentType", content_type),
        );
        added += 1;
    }

    let part_name = content_type_part_name(CELL_IMAGES_PART);
    let overridden = manifest
        .root
        .children_named(CONTENT_TYPES_NS, "Override")
        .any(|o| o.attribute("PartName") == Some(part_name.as_str()));
    if !overridden {
        let name = manifest.qualified(CONTENT_TYPES_NS, "", "Override");
        manifest.root.push(
            Element::new(name, Some(CONTENT_TYPES_NS))
                .with_attr("PartName", part_name)
                .with_attr("ContentType", CELL_IMAGES_CONTENT_TYPE),
        );
        added += 1;
    }

    if added > 0 {
        package.write(&part, &manifest)?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::PartTemplates;
    use std::fs;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#;

    fn package_with_manifest(dir: &std::path::Path, manifest: &str) -> Package {
        fs::write(dir.join("[Content_Types].xml"), manifest).unwrap();
        Package::from_dir(dir, PartTemplates::default())
    }

    fn count(package: &Package, local: &str, attr: &str, value: &str) -> usize {
        let manifest = package.open(&PartName::ContentTypes).unwrap();
        manifest
            .root
            .children_named(CONTENT_TYPES_NS, local)
            .filter(|e| e.attribute(attr) == Some(value))
            .count()
    }

    #[test]
    fn test_registration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let package = package_with_manifest(dir.path(), MANIFEST);
        let config = EmbedConfig::default();

        let added = ensure_image_content_types(&package, &config.extensions, &config).unwrap();
        assert_eq!(added, 3);
        let added = ensure_image_content_types(&package, &config.extensions, &config).unwrap();
        assert_eq!(added, 0);

        assert_eq!(count(&package, "Default", "Extension", "jpeg"), 1);
        assert_eq!(count(&package, "Default", "Extension", "JPG"), 1);
        assert_eq!(count(&package, "Override", "PartName", "/xl/cellimages.xml"), 1);
    }

    #[test]
    fn test_existing_extensions_are_not_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let package = package_with_manifest(dir.path(), MANIFEST);
        let config = EmbedConfig::default();

        let added = ensure_image_content_types(&package, &["png", "PNG"], &config).unwrap();
        // PNG differs from png by exact match, plus the override
        assert_eq!(added, 2);
        assert_eq!(count(&package, "Default", "Extension", "png"), 1);
        assert_eq!(count(&package, "Default", "Extension", "PNG"), 1);
    }

    #[test]
    fn test_untouched_manifest_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let full = MANIFEST.replace(
            "</Types>",
            r#"<Override PartName="/xl/cellimages.xml" ContentType="application/vnd.wps-officedocument.cellimage+xml"/></Types>"#,
        );
        let package = package_with_manifest(dir.path(), &full);
        let config = EmbedConfig::default();

        assert_eq!(ensure_image_content_types(&package, &["png"], &config).unwrap(), 0);
        let on_disk = fs::read_to_string(dir.path().join("[Content_Types].xml")).unwrap();
        assert_eq!(on_disk, full);
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let package = package_with_manifest(dir.path(), "<NotTypes/>");
        let config = EmbedConfig::default();
        let err = ensure_image_content_types(&package, &["png"], &config).unwrap_err();
        assert!(matches!(err, EmbedError::PartMissingRequiredStructure { .. }));
    }
}
