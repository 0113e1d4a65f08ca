//! Workbook -> `cellimages.xml` relationship

use super::{next_relationship_id, relationship_element, relationships};
use crate::error::{EmbedError, Result};
use crate::package::paths::{
    CELL_IMAGE_REL_TYPE, CELL_IMAGES_PART, RELATIONSHIPS_NS, WORKBOOK_PART, relative_target,
    resolve_target,
};
use crate::package::{Package, PartName};
use tracing::debug;

/// Make sure the workbook relationship table points at `xl/cellimages.xml`.
///
/// An existing relationship with that target is reused as is. Otherwise a new
/// one is appended under the smallest `rId<n>` not yet used in the table.
/// Returns the relationship ID either way.
pub fn ensure_workbook_links_cell_images(package: &Package) -> Result<String> {
    let part = PartName::WorkbookRels;
    let mut rels = package.open(&part)?;
    if !rels.root.is(RELATIONSHIPS_NS, "Relationships") {
        return Err(EmbedError::PartMissingRequiredStructure {
            part: part.to_string(),
            element: "Relationships",
        });
    }

    let existing = relationships(&rels).find_map(|rel| {
        let target = rel.attribute("Target")?;
        if resolve_target(WORKBOOK_PART, target) == CELL_IMAGES_PART {
            rel.attribute("Id").map(str::to_string)
        } else {
            None
        }
    });
    if let Some(id) = existing {
        debug!("Workbook already links {} as {}", CELL_IMAGES_PART, id);
        return Ok(id);
    }

    let id = next_relationship_id(&rels);
    let target = relative_target(WORKBOOK_PART, CELL_IMAGES_PART);
    let rel = relationship_element(&mut rels, &id, CELL_IMAGE_REL_TYPE, &target);
    rels.root.push(rel);
    package.write(&part, &rels)?;
    debug!("Linked {} from workbook as {}", CELL_IMAGES_PART, id);
    Ok(id)
}
