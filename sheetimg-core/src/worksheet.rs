//! Worksheet lookup and the `DISPIMG` cell patch

use crate::cell_ref::CellReference;
use crate::config::CellAddressing;
use crate::error::{EmbedError, Result};
use crate::package::paths::{RELATIONSHIPS_NS, SPREADSHEET_NS, WORKBOOK_PART, resolve_target};
use crate::package::{Package, PartName};
use crate::xml::Element;
use tracing::debug;

/// Find the worksheet part for the sheet called `sheet_name`.
///
/// The workbook's `<sheet name=.. r:id=..>` entry is followed through the
/// workbook relationship table. Packages without that entry still resolve
/// when `xl/worksheets/<sheet_name>.xml` exists.
pub fn resolve_worksheet(package: &Package, sheet_name: &str) -> Result<PartName> {
    if package.has_part(&PartName::Workbook) && package.has_part(&PartName::WorkbookRels) {
        if let Some(entry) = worksheet_from_workbook(package, sheet_name)? {
            let part = PartName::Worksheet(entry);
            if package.has_part(&part) {
                debug!("Worksheet {} is {}", sheet_name, part);
                return Ok(part);
            }
        }
    }

    let fallback = PartName::Worksheet(format!("xl/worksheets/{sheet_name}.xml"));
    if package.has_part(&fallback) {
        debug!("Worksheet {} is {} (by file name)", sheet_name, fallback);
        return Ok(fallback);
    }
    Err(EmbedError::SheetNotFound(sheet_name.to_string()))
}

fn worksheet_from_workbook(package: &Package, sheet_name: &str) -> Result<Option<String>> {
    let workbook = package.open(&PartName::Workbook)?;
    let relationship_id = workbook
        .root
        .find_child(SPREADSHEET_NS, "sheets")
        .into_iter()
        .flat_map(|sheets| sheets.children_named(SPREADSHEET_NS, "sheet"))
        .find(|sheet| sheet.attribute("name") == Some(sheet_name))
        .and_then(|sheet| {
            sheet
                .attributes
                .iter()
                .find(|(key, _)| key.ends_with(":id"))
                .map(|(_, value)| value.clone())
        });
    let Some(relationship_id) = relationship_id else {
        return Ok(None);
    };

    let rels = package.open(&PartName::WorkbookRels)?;
    let target = rels
        .root
        .children_named(RELATIONSHIPS_NS, "Relationship")
        .find(|rel| rel.attribute("Id") == Some(relationship_id.as_str()))
        .and_then(|rel| rel.attribute("Target"))
        .map(|target| resolve_target(WORKBOOK_PART, target));
    Ok(target)
}

/// Check that `(row, column)` addresses an existing cell without touching the part.
///
/// Returns the cell's `r` attribute, or the computed address when the cell
/// has none.
pub fn locate_cell(
    package: &Package,
    worksheet: &PartName,
    row: u32,
    column: u32,
    addressing: CellAddressing,
) -> Result<String> {
    let mut sheet = package.open(worksheet)?;
    let cell = find_cell(&mut sheet.root, worksheet, row, column, addressing)?;
    Ok(cell
        .attribute("r")
        .map(str::to_string)
        .unwrap_or_else(|| CellReference::new(row, column).to_excel_ref()))
}

/// Replace the cell's content with a `DISPIMG` formula for `image_id`.
///
/// Everything the cell held before (value, inline string, formula, style) is
/// discarded; only its `r` address survives. The cell type becomes `str`.
pub fn set_cell_image_reference(
    package: &Package,
    worksheet: &PartName,
    row: u32,
    column: u32,
    image_id: &str,
    addressing: CellAddressing,
) -> Result<()> {
    let mut sheet = package.open(worksheet)?;
    let cell = find_cell(&mut sheet.root, worksheet, row, column, addressing)?;
    patch_cell(cell, image_id);
    package.write(worksheet, &sheet)?;
    debug!(
        "Set {} row {} column {} to image {}",
        worksheet, row, column, image_id
    );
    Ok(())
}

/// `_xlfn.DISPIMG("<id>",1)`
pub fn dispimg_formula(image_id: &str) -> String {
    format!("_xlfn.DISPIMG(\"{image_id}\",1)")
}

/// Cached value written next to the formula
pub fn dispimg_value(image_id: &str) -> String {
    format!("=DISPIMG(\"{image_id}\",1)")
}

fn patch_cell(cell: &mut Element, image_id: &str) {
    let address = cell.attribute("r").map(str::to_string);
    cell.clear();

    // Children share the cell's prefix so a prefixed sheet stays consistent
    let qualified = |local: &str| match cell.prefix() {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    };
    let formula = Element::new(qualified("f"), Some(SPREADSHEET_NS)).with_text(dispimg_formula(image_id));
    let value = Element::new(qualified("v"), Some(SPREADSHEET_NS)).with_text(dispimg_value(image_id));

    cell.push(formula);
    cell.push(value);
    if let Some(address) = address {
        cell.set_attribute("r", address);
    }
    cell.set_attribute("t", "str");
}

fn find_cell<'a>(
    root: &'a mut Element,
    worksheet: &PartName,
    row: u32,
    column: u32,
    addressing: CellAddressing,
) -> Result<&'a mut Element> {
    let sheet = || worksheet.to_string();
    let sheet_data = root.find_child_mut(SPREADSHEET_NS, "sheetData").ok_or_else(|| {
        EmbedError::PartMissingRequiredStructure {
            part: sheet(),
            element: "sheetData",
        }
    })?;

    let row_element = match addressing {
        CellAddressing::Positional => sheet_data
            .children_named_mut(SPREADSHEET_NS, "row")
            .nth(row as usize),
        CellAddressing::ByReference => {
            let number = (row + 1).to_string();
            sheet_data
                .children_named_mut(SPREADSHEET_NS, "row")
                .find(|r| r.attribute("r") == Some(number.as_str()))
        }
    }
    .ok_or_else(|| EmbedError::IndexOutOfRange {
        sheet: sheet(),
        kind: "row",
        index: row,
    })?;

    let cell = match addressing {
        CellAddressing::Positional => row_element
            .children_named_mut(SPREADSHEET_NS, "c")
            .nth(column as usize),
        CellAddressing::ByReference => row_element
            .children_named_mut(SPREADSHEET_NS, "c")
            .find(|c| {
                c.attribute("r")
                    .and_then(CellReference::parse)
                    .is_some_and(|r| r.col == column)
            }),
    };
    cell.ok_or_else(|| EmbedError::IndexOutOfRange {
        sheet: sheet(),
        kind: "cell",
        index: column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::PartTemplates;
    use std::fs;
    use std::path::Path;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2"><v>1</v></c><c r="B2" s="3" t="inlineStr"><is><t>old</t></is></c></row></sheetData></worksheet>"#;

    const SPARSE: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="4"><c r="C4"><v>2</v></c><c r="E4"><v>3</v></c></row></sheetData></worksheet>"#;

    fn package_with_sheet(dir: &Path, xml: &str) -> (Package, PartName) {
        fs::create_dir_all(dir.join("xl/worksheets")).unwrap();
        fs::write(dir.join("xl/worksheets/sheet1.xml"), xml).unwrap();
        let package = Package::from_dir(dir, PartTemplates::default());
        (package, PartName::Worksheet("xl/worksheets/sheet1.xml".to_string()))
    }

    fn cell<'a>(root: &'a Element, row: usize, column: usize) -> &'a Element {
        root.find_child(SPREADSHEET_NS, "sheetData")
            .unwrap()
            .children_named(SPREADSHEET_NS, "row")
            .nth(row)
            .unwrap()
            .children_named(SPREADSHEET_NS, "c")
            .nth(column)
            .unwrap()
    }

    #[test]
    fn test_patch_replaces_cell_content() {
        let dir = tempfile::tempdir().unwrap();
        let (package, part) = package_with_sheet(dir.path(), SHEET);

        set_cell_image_reference(&package, &part, 1, 1, "ID_ABC", CellAddressing::Positional).unwrap();

        let sheet = package.open(&part).unwrap();
        let patched = cell(&sheet.root, 1, 1);
        assert_eq!(patched.attribute("r"), Some("B2"));
        assert_eq!(patched.attribute("t"), Some("str"));
        assert_eq!(patched.attribute("s"), None);
        let children: Vec<&str> = patched.child_elements().map(|e| e.local_name()).collect();
        assert_eq!(children, vec!["f", "v"]);
        assert_eq!(
            patched.find_child(SPREADSHEET_NS, "f").unwrap().text(),
            r#"_xlfn.DISPIMG("ID_ABC",1)"#
        );
        assert_eq!(
            patched.find_child(SPREADSHEET_NS, "v").unwrap().text(),
            r#"=DISPIMG("ID_ABC",1)"#
        );

        // Neighbours are untouched
        let left = cell(&sheet.root, 1, 0);
        assert_eq!(left.attribute("r"), Some("A2"));
        assert_eq!(left.find_child(SPREADSHEET_NS, "v").unwrap().text(), "1");
    }

    #[test]
    fn test_patching_twice_keeps_one_formula() {
        let dir = tempfile::tempdir().unwrap();
        let (package, part) = package_with_sheet(dir.path(), SHEET);

        set_cell_image_reference(&package, &part, 1, 0, "ID_1", CellAddressing::Positional).unwrap();
        set_cell_image_reference(&package, &part, 1, 0, "ID_2", CellAddressing::Positional).unwrap();

        let sheet = package.open(&part).unwrap();
        let patched = cell(&sheet.root, 1, 0);
        assert_eq!(patched.child_elements().count(), 2);
        assert!(patched.find_child(SPREADSHEET_NS, "f").unwrap().text().contains("ID_2"));
    }

    #[test]
    fn test_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let (package, part) = package_with_sheet(dir.path(), SHEET);

        let err = set_cell_image_reference(&package, &part, 5, 0, "ID", CellAddressing::Positional)
            .unwrap_err();
        assert!(matches!(err, EmbedError::IndexOutOfRange { kind: "row", index: 5, .. }));

        let err = set_cell_image_reference(&package, &part, 0, 2, "ID", CellAddressing::Positional)
            .unwrap_err();
        assert!(matches!(err, EmbedError::IndexOutOfRange { kind: "cell", index: 2, .. }));

        // Failed lookups never rewrite the part
        assert_eq!(fs::read_to_string(package.part_path(&part)).unwrap(), SHEET);
    }

    #[test]
    fn test_missing_sheet_data() {
        let dir = tempfile::tempdir().unwrap();
        let (package, part) = package_with_sheet(
            dir.path(),
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"/>"#,
        );
        let err = locate_cell(&package, &part, 0, 0, CellAddressing::Positional).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::PartMissingRequiredStructure { element: "sheetData", .. }
        ));
    }

    #[test]
    fn test_by_reference_on_sparse_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let (package, part) = package_with_sheet(dir.path(), SPARSE);

        // Row index 3 is the fourth row by number but the second <row> element
        assert_eq!(
            locate_cell(&package, &part, 3, 4, CellAddressing::ByReference).unwrap(),
            "E4"
        );
        assert!(matches!(
            locate_cell(&package, &part, 3, 4, CellAddressing::Positional).unwrap_err(),
            EmbedError::IndexOutOfRange { kind: "row", .. }
        ));
        assert!(matches!(
            locate_cell(&package, &part, 3, 3, CellAddressing::ByReference).unwrap_err(),
            EmbedError::IndexOutOfRange { kind: "cell", index: 3, .. }
        ));

        set_cell_image_reference(&package, &part, 3, 2, "ID_X", CellAddressing::ByReference).unwrap();
        let sheet = package.open(&part).unwrap();
        let patched = cell(&sheet.root, 1, 0);
        assert_eq!(patched.attribute("r"), Some("C4"));
        assert_eq!(patched.attribute("t"), Some("str"));
    }

    #[test]
    fn test_prefixed_sheet_keeps_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let (package, part) = package_with_sheet(
            dir.path(),
            r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheetData><x:row r="1"><x:c r="A1"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>"#,
        );
        set_cell_image_reference(&package, &part, 0, 0, "ID_P", CellAddressing::Positional).unwrap();
        let xml = fs::read_to_string(package.part_path(&part)).unwrap();
        assert!(xml.contains("<x:f>"));
        assert!(xml.contains("<x:v>"));
    }

    #[test]
    fn test_resolve_worksheet_through_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("xl/_rels")).unwrap();
        fs::create_dir_all(root.join("xl/worksheets")).unwrap();
        fs::write(
            root.join("xl/workbook.xml"),
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="Pics" sheetId="2" r:id="rId2"/></sheets></workbook>"#,
        )
        .unwrap();
        fs::write(
            root.join("xl/_rels/workbook.xml.rels"),
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="t" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="t" Target="/xl/worksheets/sheet2.xml"/></Relationships>"#,
        )
        .unwrap();
        fs::write(root.join("xl/worksheets/sheet1.xml"), SHEET).unwrap();
        fs::write(root.join("xl/worksheets/sheet2.xml"), SHEET).unwrap();
        let package = Package::from_dir(root, PartTemplates::default());

        assert_eq!(
            resolve_worksheet(&package, "Data").unwrap(),
            PartName::Worksheet("xl/worksheets/sheet1.xml".to_string())
        );
        assert_eq!(
            resolve_worksheet(&package, "Pics").unwrap(),
            PartName::Worksheet("xl/worksheets/sheet2.xml".to_string())
        );
        assert!(matches!(
            resolve_worksheet(&package, "Nope").unwrap_err(),
            EmbedError::SheetNotFound(name) if name == "Nope"
        ));
    }

    #[test]
    fn test_resolve_worksheet_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let (package, _) = package_with_sheet(dir.path(), SHEET);
        assert_eq!(
            resolve_worksheet(&package, "sheet1").unwrap(),
            PartName::Worksheet("xl/worksheets/sheet1.xml".to_string())
        );
    }
}
