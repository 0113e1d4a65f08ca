//! Image descriptors in `xl/cellimages.xml`

use super::relationships;
use crate::error::{EmbedError, Result};
use crate::package::paths::{DRAWING_NS, ETC_NS, OFFICE_REL_NS, XDR_NS};
use crate::package::{Package, PartName};
use crate::xml::{Element, XmlPart};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Factor from pixels to the descriptor extent.
///
/// The renderer scales a cell image to its cell, so the extent only has to
/// carry the aspect ratio; it is not a physical size.
pub const EXTENT_SCALE: u64 = 1000;

/// IDs assigned to a freshly registered image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredImage {
    /// 1-based position of the descriptor in the part (`cNvPr/@id`)
    pub index: usize,
    /// Opaque identifier used by the `DISPIMG` formula (`cNvPr/@name`)
    pub image_id: String,
    /// Relationship binding the descriptor to its media file (`a:blip/@r:embed`)
    pub relationship_id: String,
}

/// Append a descriptor for an image of `width` x `height` pixels.
///
/// The numeric index and the relationship ID share one counter that starts
/// after the `xdr:pic` elements already present: the n-th image gets index n
/// and `rId<n>`. A value whose `cNvPr/@id` or `rId` is already taken is
/// skipped. The identifier is a fresh UUID and never derived from n.
pub fn register_image(
    package: &Package,
    width: u32,
    height: u32,
    file_name: &str,
) -> Result<RegisteredImage> {
    let part = PartName::CellImages;
    package.ensure_exists(&part, &package.templates().cell_images)?;
    let mut cell_images = package.open(&part)?;
    if !cell_images.root.is(ETC_NS, "cellImages") {
        return Err(EmbedError::PartMissingRequiredStructure {
            part: part.to_string(),
            element: "cellImages",
        });
    }

    let index = next_free_index(package, &cell_images)?;
    let registered = RegisteredImage {
        index,
        image_id: new_image_id(),
        relationship_id: format!("rId{index}"),
    };

    let descriptor = descriptor(&mut cell_images, &registered, width, height, file_name);
    cell_images.root.push(descriptor);
    package.write(&part, &cell_images)?;

    debug!(
        "Registered {} as #{} {} ({})",
        file_name, registered.index, registered.image_id, registered.relationship_id
    );
    Ok(registered)
}

/// First `n > count(xdr:pic)` free both as `cNvPr/@id` and as `rId<n>`
fn next_free_index(package: &Package, cell_images: &XmlPart) -> Result<usize> {
    let used_indices: HashSet<String> = pics(&cell_images.root)
        .into_iter()
        .filter_map(|pic| pic.find_child(XDR_NS, "nvPicPr"))
        .filter_map(|nv| nv.find_child(XDR_NS, "cNvPr"))
        .filter_map(|c| c.attribute("id"))
        .map(|id| id.trim().to_string())
        .collect();
    let used_relationships: HashSet<String> = if package.has_part(&PartName::CellImagesRels) {
        let rels = package.open(&PartName::CellImagesRels)?;
        relationships(&rels)
            .filter_map(|rel| rel.attribute("Id"))
            .map(str::to_string)
            .collect()
    } else {
        HashSet::new()
    };

    let mut index = cell_images.root.count_descendants(XDR_NS, "pic") + 1;
    while used_indices.contains(&index.to_string())
        || used_relationships.contains(&format!("rId{index}"))
    {
        index += 1;
    }
    Ok(index)
}

fn new_image_id() -> String {
    format!("ID_{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// `etc:cellImage/xdr:pic` using the prefixes the part already declares
fn descriptor(
    part: &mut XmlPart,
    image: &RegisteredImage,
    width: u32,
    height: u32,
    file_name: &str,
) -> Element {
    let etc = |part: &mut XmlPart, local: &str| {
        Element::new(part.qualified(ETC_NS, "etc", local), Some(ETC_NS))
    };
    let xdr = |part: &mut XmlPart, local: &str| {
        Element::new(part.qualified(XDR_NS, "xdr", local), Some(XDR_NS))
    };
    let a = |part: &mut XmlPart, local: &str| {
        Element::new(part.qualified(DRAWING_NS, "a", local), Some(DRAWING_NS))
    };
    let embed_attr = part.qualified(OFFICE_REL_NS, "r", "embed");

    let cx = u64::from(width) * EXTENT_SCALE;
    let cy = u64::from(height) * EXTENT_SCALE;

    let non_visual = xdr(part, "nvPicPr")
        .with_child(
            xdr(part, "cNvPr")
                .with_attr("id", image.index.to_string())
                .with_attr("name", image.image_id.as_str())
                .with_attr("descr", file_name),
        )
        .with_child(xdr(part, "cNvPicPr"));

    let blip_fill = xdr(part, "blipFill")
        .with_child(a(part, "blip").with_attr(embed_attr, image.relationship_id.as_str()))
        .with_child(a(part, "stretch").with_child(a(part, "fillRect")));

    let shape = xdr(part, "spPr")
        .with_child(
            a(part, "xfrm")
                .with_child(a(part, "off").with_attr("x", "0").with_attr("y", "0"))
                .with_child(
                    a(part, "ext")
                        .with_attr("cx", cx.to_string())
                        .with_attr("cy", cy.to_string()),
                ),
        )
        .with_child(
            a(part, "prstGeom")
                .with_attr("prst", "rect")
                .with_child(a(part, "avLst")),
        );

    let pic = xdr(part, "pic")
        .with_child(non_visual)
        .with_child(blip_fill)
        .with_child(shape);

    etc(part, "cellImage").with_child(pic)
}

/// `(index, image id, relationship id)` of every descriptor, in document order
pub fn descriptors(part: &XmlPart) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    for pic in pics(&part.root) {
        let c_nv_pr = pic
            .find_child(XDR_NS, "nvPicPr")
            .and_then(|nv| nv.find_child(XDR_NS, "cNvPr"));
        let blip = pic
            .find_child(XDR_NS, "blipFill")
            .and_then(|fill| fill.find_child(DRAWING_NS, "blip"));
        let embed = blip.and_then(|b| {
            b.attributes
                .iter()
                .find(|(k, _)| k.ends_with(":embed"))
                .map(|(_, v)| v.clone())
        });
        out.push((
            c_nv_pr
                .and_then(|c| c.attribute("id"))
                .unwrap_or_default()
                .to_string(),
            c_nv_pr
                .and_then(|c| c.attribute("name"))
                .unwrap_or_default()
                .to_string(),
            embed.unwrap_or_default(),
        ));
    }
    out
}

fn pics(element: &Element) -> Vec<&Element> {
    let mut found = Vec::new();
    for child in element.child_elements() {
        if child.is(XDR_NS, "pic") {
            found.push(child);
        } else {
            found.extend(pics(child));
        }
    }
    found
}
