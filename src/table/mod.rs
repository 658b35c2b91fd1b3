//! The flat annotation table shared by the harvester and the record builder.
//!
//! One [`AnnotationRow`] per annotated object. The column set and order are
//! a fixed contract, see [`COLUMNS`]. The declared `width`/`height` columns
//! are advisory: the record builder re-reads the image for the real size.

mod group;
pub mod io_csv;

pub use group::{group_by_filename, AnnotationGroup};

use serde::{Deserialize, Serialize};

use crate::geom::{BBoxXYXY, Pixel};

/// Column names of the annotation table, in order.
pub const COLUMNS: [&str; 8] = [
    "filename", "width", "height", "class", "xmin", "ymin", "xmax", "ymax",
];

/// A single annotated object together with the image it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "class")]
    pub class_name: String,
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
}

impl AnnotationRow {
    /// Returns the object's box in pixel space.
    pub fn bbox(&self) -> BBoxXYXY<Pixel> {
        BBoxXYXY::from_xyxy(
            self.xmin as f64,
            self.ymin as f64,
            self.xmax as f64,
            self.ymax as f64,
        )
    }
}

/// An ordered table of annotation rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationTable {
    pub rows: Vec<AnnotationRow>,
}

impl AnnotationTable {
    pub fn new(rows: Vec<AnnotationRow>) -> Self {
        Self { rows }
    }

    /// Column names, always equal to [`COLUMNS`].
    pub fn columns(&self) -> &'static [&'static str] {
        &COLUMNS
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnnotationRow> {
        self.rows.iter()
    }

    /// Groups rows by filename. See [`group_by_filename`].
    pub fn group_by_filename(&self) -> Vec<AnnotationGroup> {
        group_by_filename(self.rows.iter().cloned())
    }

    /// Distinct class names, sorted.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rows.iter().map(|r| r.class_name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

impl From<Vec<AnnotationRow>> for AnnotationTable {
    fn from(rows: Vec<AnnotationRow>) -> Self {
        Self::new(rows)
    }
}

impl IntoIterator for AnnotationTable {
    type Item = AnnotationRow;
    type IntoIter = std::vec::IntoIter<AnnotationRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a AnnotationTable {
    type Item = &'a AnnotationRow;
    type IntoIter = std::slice::Iter<'a, AnnotationRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
pub(crate) fn row(
    filename: &str,
    size: (u32, u32),
    class_name: &str,
    bbox: (i64, i64, i64, i64),
) -> AnnotationRow {
    AnnotationRow {
        filename: filename.to_string(),
        width: size.0,
        height: size.1,
        class_name: class_name.to_string(),
        xmin: bbox.0,
        ymin: bbox.1,
        xmax: bbox.2,
        ymax: bbox.3,
    }
}
