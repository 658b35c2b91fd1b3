//! CSV reader and writer for the annotation table.
//!
//! The header row is always `filename,width,height,class,xmin,ymin,xmax,ymax`.
//! Box coordinates are integer pixels. Rows are written in table order and
//! read back in file order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{AnnotationRow, AnnotationTable, COLUMNS};
use crate::error::RecordprepError;

/// Reads an annotation table from a CSV file.
///
/// # Errors
/// Fails if the file cannot be opened, the header differs from [`COLUMNS`],
/// or any row does not deserialize.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use recordprep::table::io_csv::read_table_csv;
///
/// let table = read_table_csv(Path::new("annotations.csv"))?;
/// # Ok::<(), recordprep::RecordprepError>(())
/// ```
pub fn read_table_csv(path: &Path) -> Result<AnnotationTable, RecordprepError> {
    let file = File::open(path).map_err(RecordprepError::Io)?;
    read_rows(BufReader::new(file), path)
}

/// Writes an annotation table to a CSV file.
pub fn write_table_csv(path: &Path, table: &AnnotationTable) -> Result<(), RecordprepError> {
    let file = File::create(path).map_err(RecordprepError::Io)?;
    let writer = write_rows(BufWriter::new(file), table, path)?;
    writer
        .into_inner()
        .map_err(|e| RecordprepError::Io(e.into_error()))?
        .flush()
        .map_err(RecordprepError::Io)
}

/// Reads an annotation table from a CSV string.
pub fn from_table_csv_str(csv_str: &str) -> Result<AnnotationTable, RecordprepError> {
    from_table_csv_slice(csv_str.as_bytes())
}

/// Reads an annotation table from CSV bytes.
pub fn from_table_csv_slice(bytes: &[u8]) -> Result<AnnotationTable, RecordprepError> {
    read_rows(bytes, Path::new("<bytes>"))
}

/// Writes an annotation table to a CSV string.
pub fn to_table_csv_string(table: &AnnotationTable) -> Result<String, RecordprepError> {
    let dummy_path = Path::new("<string>");
    let writer = write_rows(Vec::new(), table, dummy_path)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| RecordprepError::Io(e.into_error()))?;

    String::from_utf8(bytes).map_err(|e| RecordprepError::TableInvalid {
        path: dummy_path.to_path_buf(),
        message: format!("Invalid UTF-8 in output: {}", e),
    })
}

fn read_rows<R: Read>(reader: R, path: &Path) -> Result<AnnotationTable, RecordprepError> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|source| RecordprepError::TableCsvParse {
            path: path.to_path_buf(),
            source,
        })?;
    if !headers.iter().eq(COLUMNS.iter().copied()) {
        return Err(RecordprepError::TableInvalid {
            path: path.to_path_buf(),
            message: format!(
                "expected header '{}', found '{}'",
                COLUMNS.join(","),
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        });
    }

    let mut rows = Vec::new();
    for result in csv_reader.deserialize() {
        let row: AnnotationRow = result.map_err(|source| RecordprepError::TableCsvParse {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }

    Ok(AnnotationTable::new(rows))
}

fn write_rows<W: Write>(
    writer: W,
    table: &AnnotationTable,
    path: &Path,
) -> Result<csv::Writer<W>, RecordprepError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    // An empty table still gets its header.
    if table.is_empty() {
        csv_writer
            .write_record(COLUMNS)
            .map_err(|source| RecordprepError::TableCsvWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }

    for row in table {
        csv_writer
            .serialize(row)
            .map_err(|source| RecordprepError::TableCsvWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }

    Ok(csv_writer)
}
