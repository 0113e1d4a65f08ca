//! Part names, namespaces and relationship target resolution

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::borrow::Cow;

pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const OFFICE_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
pub const DRAWING_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const ETC_NS: &str = "http://www.wps.cn/officeDocument/2017/etCustomData";

pub const CELL_IMAGE_REL_TYPE: &str = "http://www.wps.cn/officeDocument/2020/cellImage";
pub const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const CELL_IMAGES_CONTENT_TYPE: &str = "application/vnd.wps-officedocument.cellimage+xml";

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const CELL_IMAGES_PART: &str = "xl/cellimages.xml";
pub const MEDIA_DIR: &str = "xl/media";

/// Logical parts the editor touches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartName {
    ContentTypes,
    Workbook,
    WorkbookRels,
    CellImages,
    CellImagesRels,
    /// A worksheet, by zip entry name (e.g. `xl/worksheets/sheet1.xml`)
    Worksheet(String),
}

impl PartName {
    /// Zip entry name of the part
    pub fn entry_name(&self) -> Cow<'_, str> {
        match self {
            PartName::ContentTypes => Cow::Borrowed("[Content_Types].xml"),
            PartName::Workbook => Cow::Borrowed(WORKBOOK_PART),
            PartName::WorkbookRels => Cow::Owned(rels_for_part(WORKBOOK_PART)),
            PartName::CellImages => Cow::Borrowed(CELL_IMAGES_PART),
            PartName::CellImagesRels => Cow::Owned(rels_for_part(CELL_IMAGES_PART)),
            PartName::Worksheet(entry) => Cow::Borrowed(entry.as_str()),
        }
    }
}

impl std::fmt::Display for PartName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.entry_name())
    }
}

/// `PartName` attribute value used by `[Content_Types].xml` overrides
pub fn content_type_part_name(entry: &str) -> String {
    format!("/{}", entry.trim_start_matches('/'))
}

pub fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Bytes escaped in a relationship target; `/` stays a separator.
/// Non-ASCII is always escaped.
const TARGET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Target URI of `entry` written relative to the directory of `source_part`
pub fn relative_target(source_part: &str, entry: &str) -> String {
    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    let path = if base_dir.is_empty() {
        entry.to_string()
    } else {
        match entry.strip_prefix(base_dir).and_then(|rest| rest.strip_prefix('/')) {
            Some(rest) => rest.to_string(),
            None => format!("/{entry}"),
        }
    };
    utf8_percent_encode(&path, TARGET).to_string()
}

pub fn resolve_target(source_part: &str, target: &str) -> String {
    // Relationship targets are URIs; some producers include a fragment.
    let target = target.split('#').next().unwrap_or(target);
    let decoded = percent_decode_str(target).decode_utf8_lossy();
    let target: &str = &decoded;
    if target.is_empty() {
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}
