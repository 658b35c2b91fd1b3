//! What `validate` found, in a form for terminals (`Display`) and for
//! scripts (`Serialize`).
//!
//! Text output lists errors before warnings so the blocking problems are
//! read first; within each severity the table order is kept.

use std::fmt;

use serde::Serialize;

/// Issues collected over one table, in the order they were found.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.with_severity(Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.with_severity(Severity::Warning).count()
    }

    /// Number of issues carrying `code`.
    pub fn count(&self, code: IssueCode) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    /// No errors; warnings allowed.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether the report should fail a run. In strict mode warnings count.
    pub fn fails(&self, strict: bool) -> bool {
        if strict {
            !self.is_clean()
        } else {
            !self.is_ok()
        }
    }

    fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation found {} error(s) and {} warning(s)",
            self.error_count(),
            self.warning_count()
        )?;

        for severity in [Severity::Error, Severity::Warning] {
            let mut issues = self.with_severity(severity).peekable();
            if issues.peek().is_none() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{}:", severity.heading())?;
            for issue in issues {
                writeln!(f, "  {}", issue)?;
            }
        }

        Ok(())
    }
}

/// One problem in the table or its images.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub context: IssueContext,
}

impl ValidationIssue {
    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            context,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}: {}", self.code, self.context, self.message)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Records can still be built, but the data looks suspicious.
    Warning,
    /// Building records from this data fails or produces wrong boxes.
    Error,
}

impl Severity {
    fn heading(self) -> &'static str {
        match self {
            Severity::Error => "Errors",
            Severity::Warning => "Warnings",
        }
    }
}

/// Stable codes for filtering or scripting against reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCode {
    /// The table has no rows.
    EmptyTable,

    // Image issues
    /// A row has an empty filename.
    EmptyFileName,
    /// Declared width or height is zero.
    InvalidImageDimensions,
    /// Rows of one image declare different sizes.
    InconsistentDimensions,
    /// The filename would resolve outside the images directory.
    UnsafeImagePath,
    /// The image file could not be found in the images directory.
    ImageNotFound,
    /// The image file's size could not be read.
    ImageUnreadable,
    /// The declared size differs from the decoded image.
    DimensionMismatch,
    /// The filename has no extension to infer a format from.
    MissingExtension,

    // Class issues
    /// A row has an empty class name.
    EmptyClassName,
    /// A class is absent from the label map.
    UnknownClass,

    // Box issues
    /// `xmin > xmax` or `ymin > ymax`.
    InvalidBBoxOrdering,
    /// The box has zero width or height.
    InvalidBBoxArea,
    /// The box extends outside the declared image bounds.
    BBoxOutOfBounds,
}

/// Where an issue was found.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueContext {
    /// The table as a whole.
    Table,
    /// One row; `index` is zero-based in table order.
    Row { index: usize, filename: String },
    /// Every row sharing `filename`, or the image file itself.
    Image { filename: String },
    /// A class name, across all rows that use it.
    Class { name: String },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Table => f.write_str("table"),
            IssueContext::Row { index, filename } => write!(f, "row {index} ({filename})"),
            IssueContext::Image { filename } => write!(f, "image {filename}"),
            IssueContext::Class { name } => write!(f, "class '{name}'"),
        }
    }
}
