//! Registrars that keep the package parts consistent with each other
//!
//! Each registrar owns one part: it opens it, appends what is missing and
//! writes it back. Cross-part agreement (relationship IDs, targets, part
//! names) comes from the values registrars return to the orchestrator.

pub mod cell_images;
pub mod content_types;
pub mod image_rels;
pub mod workbook_rels;

pub use cell_images::{EXTENT_SCALE, RegisteredImage, register_image};
pub use content_types::ensure_image_content_types;
pub use image_rels::register_image_relationship;
pub use workbook_rels::ensure_workbook_links_cell_images;

use crate::package::paths::RELATIONSHIPS_NS;
use crate::xml::{Element, XmlPart};
use std::collections::HashSet;

/// `Relationship` children of a relationship table
fn relationships(rels: &XmlPart) -> impl Iterator<Item = &Element> {
    rels.root.children_named(RELATIONSHIPS_NS, "Relationship")
}

/// Smallest `rId<n>` (n >= 1) not used in the table
fn next_relationship_id(rels: &XmlPart) -> String {
    let used: HashSet<u32> = relationships(rels)
        .filter_map(|rel| rel.attribute("Id"))
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|n| n.parse().ok())
        .collect();
    let n = (1..).find(|n| !used.contains(n)).unwrap_or(1);
    format!("rId{n}")
}

fn relationship_element(rels: &mut XmlPart, id: &str, rel_type: &str, target: &str) -> Element {
    let name = rels.qualified(RELATIONSHIPS_NS, "", "Relationship");
    Element::new(name, Some(RELATIONSHIPS_NS))
        .with_attr("Id", id)
        .with_attr("Type", rel_type)
        .with_attr("Target", target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rels(ids: &[&str]) -> XmlPart {
        let mut xml = String::from(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for id in ids {
            xml.push_str(&format!(r#"<Relationship Id="{id}" Type="t" Target="x"/>"#));
        }
        xml.push_str("</Relationships>");
        XmlPart::parse(&xml, "rels").unwrap()
    }

    #[test]
    fn test_next_relationship_id_fills_gaps() {
        assert_eq!(next_relationship_id(&rels(&[])), "rId1");
        assert_eq!(next_relationship_id(&rels(&["rId1", "rId2", "rId3"])), "rId4");
        assert_eq!(next_relationship_id(&rels(&["rId1", "rId3"])), "rId2");
        assert_eq!(next_relationship_id(&rels(&["rId100", "custom"])), "rId1");
    }

    #[test]
    fn test_relationship_element_uses_default_namespace() {
        let mut part = rels(&[]);
        let rel = relationship_element(&mut part, "rId1", "t", "media/a.png");
        assert_eq!(rel.name, "Relationship");
        assert!(rel.is(RELATIONSHIPS_NS, "Relationship"));
        assert_eq!(rel.attribute("Target"), Some("media/a.png"));
    }
}
