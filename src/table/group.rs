use indexmap::IndexMap;

use super::AnnotationRow;

/// The rows of one image, in table order. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationGroup {
    filename: String,
    rows: Vec<AnnotationRow>,
}

impl AnnotationGroup {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn rows(&self) -> &[AnnotationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Groups built by [`group_by_filename`] are never empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The `(width, height)` declared by the first row.
    pub fn declared_size(&self) -> (u32, u32) {
        let first = &self.rows[0];
        (first.width, first.height)
    }
}

/// Groups rows by `filename` in a single pass.
///
/// Groups come out in order of each filename's first appearance, and rows
/// inside a group keep their relative input order, so interleaved input
/// like `A, B, A` yields `[A: a0, a1], [B: b0]`.
pub fn group_by_filename<I>(rows: I) -> Vec<AnnotationGroup>
where
    I: IntoIterator<Item = AnnotationRow>,
{
    let mut by_name: IndexMap<String, Vec<AnnotationRow>> = IndexMap::new();
    for row in rows {
        by_name.entry(row.filename.clone()).or_default().push(row);
    }

    by_name
        .into_iter()
        .map(|(filename, rows)| AnnotationGroup { filename, rows })
        .collect()
}
