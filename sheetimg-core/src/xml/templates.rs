//! Seed content for parts created on first use

const CELL_IMAGES_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<etc:cellImages xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:etc="http://www.wps.cn/officeDocument/2017/etCustomData"/>
"#;

const RELATIONSHIPS_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>
"#;

/// Minimal skeletons for the parts this crate may have to create.
///
/// A `Package` owns one instance; nothing global is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTemplates {
    /// Empty `xl/cellimages.xml`
    pub cell_images: String,
    /// Empty relationship table, used for `xl/_rels/cellimages.xml.rels`
    pub relationships: String,
}

impl Default for PartTemplates {
    fn default() -> Self {
        Self {
            cell_images: CELL_IMAGES_TEMPLATE.to_string(),
            relationships: RELATIONSHIPS_TEMPLATE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::paths::{ETC_NS, RELATIONSHIPS_NS};
    use crate::xml::XmlPart;

    #[test]
    fn test_templates_are_empty_well_formed_parts() {
        let templates = PartTemplates::default();

        let cell_images = XmlPart::parse(&templates.cell_images, "cellimages").unwrap();
        assert!(cell_images.root.is(ETC_NS, "cellImages"));
        assert_eq!(cell_images.root.child_elements().count(), 0);

        let rels = XmlPart::parse(&templates.relationships, "rels").unwrap();
        assert!(rels.root.is(RELATIONSHIPS_NS, "Relationships"));
        assert_eq!(rels.root.child_elements().count(), 0);
    }
}
