//! Annotation table validation.
//!
//! Checks a table before records are built:
//! - Image metadata (non-empty filename, positive and consistent declared size)
//! - Classes (non-empty, present in the label map when one is given)
//! - Box geometry (ordered, non-zero area, inside the declared size)
//! - Optionally the images themselves (present, readable, same size as declared)

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::label_map::LabelMap;
use crate::record::{check_image_filename, image_format};
use crate::table::AnnotationTable;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
    /// When set, every referenced image is opened and its size compared
    /// against the declared size.
    pub images_dir: Option<PathBuf>,
}

/// Validates a table and returns every issue found.
pub fn validate_table(
    table: &AnnotationTable,
    label_map: Option<&LabelMap>,
    opts: &ValidateOptions,
) -> ValidationReport {
    let mut report = ValidationReport::new();

    if table.is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::EmptyTable,
            "Table has no rows",
            IssueContext::Table,
        ));
        return report;
    }

    let declared = validate_images(table, &mut report);
    validate_classes(table, label_map, &mut report);
    validate_boxes(table, &mut report);

    if let Some(images_dir) = &opts.images_dir {
        validate_image_files(&declared, images_dir, &mut report);
    }

    report
}

/// Checks per-image metadata and returns the first declared size per image.
fn validate_images(
    table: &AnnotationTable,
    report: &mut ValidationReport,
) -> IndexMap<String, (u32, u32)> {
    let mut declared: IndexMap<String, (u32, u32)> = IndexMap::new();
    let mut reported_inconsistent = BTreeSet::new();

    for (index, row) in table.iter().enumerate() {
        let context = || IssueContext::Row {
            index,
            filename: row.filename.clone(),
        };

        if row.filename.is_empty() {
            report.add(ValidationIssue::error(
                IssueCode::EmptyFileName,
                "Empty filename",
                context(),
            ));
        }

        if row.width == 0 || row.height == 0 {
            report.add(ValidationIssue::error(
                IssueCode::InvalidImageDimensions,
                format!(
                    "Invalid dimensions {}x{} (must be positive)",
                    row.width, row.height
                ),
                context(),
            ));
        }

        match declared.get(&row.filename) {
            Some(&(w, h)) if (w, h) != (row.width, row.height) => {
                if reported_inconsistent.insert(row.filename.clone()) {
                    report.add(ValidationIssue::error(
                        IssueCode::InconsistentDimensions,
                        format!(
                            "Rows declare both {}x{} and {}x{}",
                            w, h, row.width, row.height
                        ),
                        IssueContext::Image {
                            filename: row.filename.clone(),
                        },
                    ));
                }
            }
            Some(_) => {}
            None => {
                declared.insert(row.filename.clone(), (row.width, row.height));
            }
        }
    }

    for filename in declared.keys() {
        if filename.is_empty() {
            continue;
        }
        if check_image_filename(filename).is_err() {
            report.add(ValidationIssue::error(
                IssueCode::UnsafeImagePath,
                "Filename must be a relative path inside the images directory",
                IssueContext::Image {
                    filename: filename.clone(),
                },
            ));
        }
        if image_format(filename).is_err() {
            report.add(ValidationIssue::error(
                IssueCode::MissingExtension,
                "Filename has no extension; the image format cannot be inferred",
                IssueContext::Image {
                    filename: filename.clone(),
                },
            ));
        }
    }

    declared
}

fn validate_classes(
    table: &AnnotationTable,
    label_map: Option<&LabelMap>,
    report: &mut ValidationReport,
) {
    for (index, row) in table.iter().enumerate() {
        if row.class_name.is_empty() {
            report.add(ValidationIssue::error(
                IssueCode::EmptyClassName,
                "Empty class name",
                IssueContext::Row {
                    index,
                    filename: row.filename.clone(),
                },
            ));
        }
    }

    let Some(label_map) = label_map else {
        return;
    };

    // One issue per missing class, not per row.
    for name in table.class_names() {
        if !name.is_empty() && !label_map.contains(&name) {
            let rows = table.iter().filter(|r| r.class_name == name).count();
            report.add(ValidationIssue::error(
                IssueCode::UnknownClass,
                format!("Not in the label map ({} row(s))", rows),
                IssueContext::Class { name },
            ));
        }
    }
}

fn validate_boxes(table: &AnnotationTable, report: &mut ValidationReport) {
    for (index, row) in table.iter().enumerate() {
        let context = || IssueContext::Row {
            index,
            filename: row.filename.clone(),
        };
        let bbox = row.bbox();

        if !bbox.is_ordered() {
            report.add(ValidationIssue::error(
                IssueCode::InvalidBBoxOrdering,
                format!(
                    "Invalid ordering: min ({}, {}) should be <= max ({}, {})",
                    row.xmin, row.ymin, row.xmax, row.ymax
                ),
                context(),
            ));
        } else if !bbox.has_area() {
            report.add(ValidationIssue::warning(
                IssueCode::InvalidBBoxArea,
                format!(
                    "Zero area box ({}, {}, {}, {})",
                    row.xmin, row.ymin, row.xmax, row.ymax
                ),
                context(),
            ));
        }

        if row.width > 0
            && row.height > 0
            && !bbox.is_within(row.width as f64, row.height as f64)
        {
            report.add(ValidationIssue::warning(
                IssueCode::BBoxOutOfBounds,
                format!(
                    "Box ({}, {}, {}, {}) extends outside image bounds (0, 0, {}, {}); \
                     normalized values will leave [0, 1]",
                    row.xmin, row.ymin, row.xmax, row.ymax, row.width, row.height
                ),
                context(),
            ));
        }
    }
}

fn validate_image_files(
    declared: &IndexMap<String, (u32, u32)>,
    images_dir: &Path,
    report: &mut ValidationReport,
) {
    for (filename, &(declared_w, declared_h)) in declared {
        // Empty and unsafe names were already reported.
        if filename.is_empty() || check_image_filename(filename).is_err() {
            continue;
        }
        let context = || IssueContext::Image {
            filename: filename.clone(),
        };

        let path = images_dir.join(filename);
        if !path.is_file() {
            report.add(ValidationIssue::error(
                IssueCode::ImageNotFound,
                format!("No image at {}", path.display()),
                context(),
            ));
            continue;
        }

        match imagesize::size(&path) {
            Ok(size) => {
                if (size.width, size.height) != (declared_w as usize, declared_h as usize) {
                    report.add(ValidationIssue::warning(
                        IssueCode::DimensionMismatch,
                        format!(
                            "Declared {}x{} but image is {}x{}; records use the image size",
                            declared_w, declared_h, size.width, size.height
                        ),
                        context(),
                    ));
                }
            }
            Err(source) => {
                report.add(ValidationIssue::error(
                    IssueCode::ImageUnreadable,
                    format!("Cannot read image size: {}", source),
                    context(),
                ));
            }
        }
    }
}
