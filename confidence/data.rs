//! # Profile Dataset Loading
//!
//! Reads the delimited table produced by the profile generator into a
//! column-major matrix of raw text. Values are not coerced here: the grouping
//! step decides per column whether it is numeric.
//!
//! - Positional Schema: columns are matched to the header table by position. The
//!   generator's own header row uses different spellings (`total_cholesterol`,
//!   `diabetes_history`, ...), so only the column count is enforced.
//! - Duplicate Names: several headers (`Age`, `Gender`, `HDL`, ...) appear twice,
//!   once for each risk calculator, which is why columns are never looked up by name.

use crate::schema::HeaderSchema;
use csv::{ReaderBuilder, Trim};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error reading delimited data: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "The input file has {found} columns, but the header schema defines {expected}. Columns are matched by position."
    )]
    ColumnCountMismatch { found: usize, expected: usize },
    #[error("Row {row} has {found} fields, but the header has {expected}.")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("The input file contains a header but no data rows.")]
    NoRows,
    #[error("Column '{name}' has {found} values, but the first column has {expected}.")]
    RaggedColumns {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("{names} column names were given for {columns} columns.")]
    NameCountMismatch { names: usize, columns: usize },
}

/// Named, row-aligned text columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMatrix {
    names: Vec<String>,
    columns: Vec<Vec<String>>,
}

impl ColumnMatrix {
    /// Builds a matrix from already-split columns, checking row alignment.
    pub fn new(names: Vec<String>, columns: Vec<Vec<String>>) -> Result<Self, DataError> {
        if names.len() != columns.len() {
            return Err(DataError::NameCountMismatch {
                names: names.len(),
                columns: columns.len(),
            });
        }
        if let Some(first) = columns.first() {
            let expected = first.len();
            for (name, column) in names.iter().zip(&columns) {
                if column.len() != expected {
                    return Err(DataError::RaggedColumns {
                        name: name.clone(),
                        found: column.len(),
                        expected,
                    });
                }
            }
        }
        Ok(Self { names, columns })
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn column(&self, index: usize) -> Option<&[String]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}

/// Picks the field separator from the file extension: tab for `.tsv`, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// Loads a profile dataset and validates its width against `schema`.
pub fn load_column_matrix(path: &Path, schema: &HeaderSchema) -> Result<ColumnMatrix, DataError> {
    let matrix = read_columns(path)?;
    if matrix.width() != schema.len() {
        return Err(DataError::ColumnCountMismatch {
            found: matrix.width(),
            expected: schema.len(),
        });
    }
    for (index, spec) in schema.columns().iter().enumerate() {
        let found = matrix.name(index).unwrap_or_default();
        if !found.eq_ignore_ascii_case(&spec.header) {
            log::debug!(
                "Column {index}: file header '{found}' read as schema column '{}'",
                spec.header
            );
        }
    }
    Ok(matrix)
}

/// Reads any delimited file with a header row into text columns.
pub fn read_columns(path: &Path) -> Result<ColumnMatrix, DataError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); names.len()];

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != names.len() {
            return Err(DataError::RaggedRow {
                row: i + 1,
                found: record.len(),
                expected: names.len(),
            });
        }
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    if columns.first().is_none_or(Vec::is_empty) {
        return Err(DataError::NoRows);
    }
    log::info!(
        "Loaded {} rows x {} columns from '{}'",
        columns[0].len(),
        names.len(),
        path.display()
    );
    ColumnMatrix::new(names, columns)
}
