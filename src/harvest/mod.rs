//! Harvests per-image XML annotations into one [`AnnotationTable`].
//!
//! Each `*.xml` file directly inside the directory describes one image in
//! the Pascal VOC layout:
//!
//! ```xml
//! <annotation>
//!   <filename>airplane1.png</filename>
//!   <size><width>256</width><height>256</height></size>
//!   <object>
//!     <name>airplane</name>
//!     <bndbox><xmin>96</xmin><ymin>96</ymin><xmax>128</xmax><ymax>128</ymax></bndbox>
//!   </object>
//! </annotation>
//! ```
//!
//! Every `<object>` becomes one row. Files are visited in file-name order so
//! the table is reproducible across platforms. A file without objects adds
//! no rows; it is logged and counted in [`HarvestSummary::empty_files`].

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use roxmltree::Node;
use walkdir::WalkDir;

use crate::error::RecordprepError;
use crate::table::{AnnotationRow, AnnotationTable};

const ANNOTATION_EXTENSION: &str = "xml";

/// The harvested table plus what was seen on the way.
#[derive(Clone, Debug, Default)]
pub struct Harvest {
    pub table: AnnotationTable,
    pub summary: HarvestSummary,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Annotation files parsed.
    pub files: usize,
    /// Files that declared no `<object>` entries.
    pub empty_files: Vec<PathBuf>,
    /// `.xml` files below the top level that were not read.
    pub skipped_nested: usize,
}

/// Reads every annotation file in `dir` into a flat table.
///
/// # Errors
/// The first malformed file aborts the whole harvest with
/// [`RecordprepError::AnnotationParse`] naming that file.
pub fn harvest(dir: &Path) -> Result<AnnotationTable, RecordprepError> {
    harvest_with_summary(dir).map(|harvest| harvest.table)
}

/// Like [`harvest`], also returning a [`HarvestSummary`].
pub fn harvest_with_summary(dir: &Path) -> Result<Harvest, RecordprepError> {
    if !dir.is_dir() {
        return Err(RecordprepError::AnnotationDirInvalid {
            path: dir.to_path_buf(),
            message: "input must be a directory".to_string(),
        });
    }

    let (xml_files, skipped_nested) = collect_xml_files(dir)?;
    let mut summary = HarvestSummary {
        files: xml_files.len(),
        skipped_nested,
        ..Default::default()
    };

    let mut rows = Vec::new();
    for xml_path in xml_files {
        let xml = fs::read_to_string(&xml_path).map_err(|source| {
            RecordprepError::AnnotationParse {
                path: xml_path.clone(),
                message: source.to_string(),
            }
        })?;
        let file_rows = parse_annotation_str(&xml, &xml_path)?;

        if file_rows.is_empty() {
            warn!(
                "{} declares no objects; it contributes no rows",
                xml_path.display()
            );
            summary.empty_files.push(xml_path);
            continue;
        }

        debug!("{}: {} object(s)", xml_path.display(), file_rows.len());
        rows.extend(file_rows);
    }

    Ok(Harvest {
        table: AnnotationTable::new(rows),
        summary,
    })
}

/// Parses one annotation document held in memory.
///
/// Returns one row per `<object>`, in document order.
pub fn from_annotation_xml_str(xml: &str) -> Result<Vec<AnnotationRow>, RecordprepError> {
    parse_annotation_str(xml, Path::new("<memory>"))
}

/// Parses one annotation document from bytes. The input must be UTF-8.
pub fn from_annotation_xml_slice(bytes: &[u8]) -> Result<Vec<AnnotationRow>, RecordprepError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| RecordprepError::AnnotationParse {
        path: PathBuf::from("<memory>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    from_annotation_xml_str(xml)
}

/// Lists the `*.xml` files directly inside `dir`, sorted by file name, and
/// counts the ones further down that are left unread.
fn collect_xml_files(dir: &Path) -> Result<(Vec<PathBuf>, usize), RecordprepError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            // An unreadable annotation file fails the harvest; anything else
            // at the top level (a dangling link, a looping directory) is not
            // an annotation and is skipped.
            Err(err) => match err.path() {
                Some(path) if err.depth() > 0 && has_xml_extension(path) => {
                    return Err(RecordprepError::AnnotationParse {
                        path: path.to_path_buf(),
                        message: err.to_string(),
                    });
                }
                Some(path) if err.depth() > 0 => {
                    debug!("skipping {}: {}", path.display(), err);
                    continue;
                }
                _ => {
                    return Err(RecordprepError::AnnotationDirInvalid {
                        path: dir.to_path_buf(),
                        message: format!("failed to list annotation directory: {err}"),
                    });
                }
            },
        };

        if entry.file_type().is_file() && has_xml_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort_by_cached_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let nested = count_nested_xml_files(dir);
    if nested > 0 {
        warn!(
            "annotation scan is flat; skipping {} nested .xml file(s) under {}",
            nested,
            dir.display()
        );
    }

    Ok((files, nested))
}

/// Best effort: walk errors below the top level are logged, never returned.
fn count_nested_xml_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .follow_links(true)
        .min_depth(2)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("not counting nested entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_xml_extension(entry.path()))
        .count()
}

fn parse_annotation_str(xml: &str, path: &Path) -> Result<Vec<AnnotationRow>, RecordprepError> {
    let document =
        roxmltree::Document::parse(xml).map_err(|source| RecordprepError::AnnotationParse {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(parse_error(path, "missing <annotation> root element"));
    }

    let filename = required_child_text(annotation, "filename", path, "<annotation>")?;
    let size = required_child_element(annotation, "size", path, "<annotation>")?;
    let width = parse_required_u32(size, "width", path, "<size>")?;
    let height = parse_required_u32(size, "height", path, "<size>")?;

    let mut rows = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let class_name = required_child_text(object, "name", path, "<object>")?;
        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;

        rows.push(AnnotationRow {
            filename: filename.clone(),
            width,
            height,
            class_name,
            xmin: parse_required_coord(bndbox, "xmin", path)?,
            ymin: parse_required_coord(bndbox, "ymin", path)?,
            xmax: parse_required_coord(bndbox, "xmax", path)?,
            ymax: parse_required_coord(bndbox, "ymax", path)?,
        });
    }

    Ok(rows)
}

fn parse_error(path: &Path, message: impl Into<String>) -> RecordprepError {
    RecordprepError::AnnotationParse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, RecordprepError> {
    child_element(node, tag)
        .ok_or_else(|| parse_error(path, format!("missing <{tag}> in {context}")))
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, RecordprepError> {
    optional_child_text(node, tag)
        .ok_or_else(|| parse_error(path, format!("missing <{tag}> in {context}")))
}

fn parse_required_u32(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<u32, RecordprepError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<u32>().map_err(|_| {
        parse_error(
            path,
            format!("invalid <{tag}> value '{raw}' in {context}; expected u32"),
        )
    })
}

/// Box bounds are integers; decimal text is truncated toward zero.
fn parse_required_coord(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
) -> Result<i64, RecordprepError> {
    let raw = required_child_text(node, tag, path, "<bndbox>")?;
    coerce_coord(&raw).ok_or_else(|| {
        parse_error(
            path,
            format!("invalid <{tag}> value '{raw}' in <bndbox>; expected a number"),
        )
    })
}

fn coerce_coord(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok().filter(|v| v.is_finite())?;
    let truncated = value.trunc();
    (truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64).then_some(truncated as i64)
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(ANNOTATION_EXTENSION))
        .unwrap_or(false)
}
