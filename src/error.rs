use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for recordprep operations.
#[derive(Debug, Error)]
pub enum RecordprepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse annotation file {path}: {message}")]
    AnnotationParse { path: PathBuf, message: String },

    #[error("Invalid annotation directory {path}: {message}")]
    AnnotationDirInvalid { path: PathBuf, message: String },

    #[error("Image filename '{filename}' must be a relative path inside the images directory")]
    UnsafeImagePath { filename: String },

    #[error("Image not found: {path}")]
    ImageNotFound { path: PathBuf },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Class '{class_name}' in '{filename}' is not present in the label map")]
    UnknownClass {
        class_name: String,
        filename: String,
    },

    #[error("Cannot infer image format: '{filename}' has no file extension")]
    MissingExtension { filename: String },

    #[error("Failed to parse label map {path}: {message}")]
    LabelMapParse { path: PathBuf, message: String },

    #[error("Invalid label map {path}: {message}")]
    LabelMapInvalid { path: PathBuf, message: String },

    #[error("Failed to parse annotation table {path}: {source}")]
    TableCsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write annotation table {path}: {source}")]
    TableCsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid annotation table {path}: {message}")]
    TableInvalid { path: PathBuf, message: String },

    #[error("Failed to write records to {path}: {message}")]
    RecordWrite { path: PathBuf, message: String },

    #[error("Failed to read records from {path}: {message}")]
    RecordRead { path: PathBuf, message: String },

    #[error("{failed} of {total} image(s) failed to build")]
    BuildFailed { failed: usize, total: usize },

    #[error("Failed to render report as JSON: {0}")]
    ReportJson(#[from] serde_json::Error),

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
