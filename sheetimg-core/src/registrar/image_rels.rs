//! `xl/_rels/cellimages.xml.rels` entries

use super::relationship_element;
use crate::error::{EmbedError, Result};
use crate::package::paths::{CELL_IMAGES_PART, IMAGE_REL_TYPE, MEDIA_DIR, RELATIONSHIPS_NS, relative_target};
use crate::package::{Package, PartName};
use tracing::debug;

/// Bind `relationship_id` to `xl/media/<media_file_name>`.
///
/// The target is written as a percent-encoded relative URI.
///
/// No duplicate check: the ID comes straight from
/// [`register_image`](super::register_image) and is fresh.
pub fn register_image_relationship(
    package: &Package,
    relationship_id: &str,
    media_file_name: &str,
) -> Result<()> {
    let part = PartName::CellImagesRels;
    package.ensure_exists(&part, &package.templates().relationships)?;
    let mut rels = package.open(&part)?;
    if !rels.root.is(RELATIONSHIPS_NS, "Relationships") {
        return Err(EmbedError::PartMissingRequiredStructure {
            part: part.to_string(),
            element: "Relationships",
        });
    }

    let target = relative_target(CELL_IMAGES_PART, &format!("{MEDIA_DIR}/{media_file_name}"));
    let rel = relationship_element(&mut rels, relationship_id, IMAGE_REL_TYPE, &target);
    rels.root.push(rel);
    package.write(&part, &rels)?;
    debug!("Bound {} to {}", relationship_id, target);
    Ok(())
}
