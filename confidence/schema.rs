//! # Header Schema
//!
//! The column layout of a profile dataset is fixed by the producer that generates
//! it: every row carries the ASCVD inputs and score, the SMART inputs and score,
//! and the Unmet Risk index. Columns are addressed by position, so the schema is
//! an explicit, immutable table that is handed to every consumer instead of a
//! literal repeated wherever a header is needed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Whether an attribute's values are looked up exactly or by nearest numeric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Categorical,
    Continuous,
}

/// One column of the header table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub header: String,
    pub kind: AttributeKind,
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML schema file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("The schema defines no columns.")]
    Empty,
    #[error("Column index {index} is outside the schema, which has {width} columns.")]
    ColumnOutOfRange { index: usize, width: usize },
}

/// The positional header table of a profile dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSchema {
    columns: Vec<ColumnSpec>,
}

const DEFAULT_COLUMNS: [(&str, AttributeKind); 26] = [
    ("Race", AttributeKind::Categorical),
    ("Gender", AttributeKind::Categorical),
    ("Age", AttributeKind::Continuous),
    ("Systolic", AttributeKind::Continuous),
    ("Total Cholesterol", AttributeKind::Continuous),
    ("HDL", AttributeKind::Continuous),
    ("Diabetes", AttributeKind::Categorical),
    ("Smoker", AttributeKind::Categorical),
    ("On hypertension treatment", AttributeKind::Categorical),
    ("ASCVD 10 Y Risk Score", AttributeKind::Continuous),
    ("Age", AttributeKind::Continuous),
    ("Gender", AttributeKind::Categorical),
    ("Smoking", AttributeKind::Categorical),
    ("Systolic", AttributeKind::Continuous),
    ("Diabetes", AttributeKind::Categorical),
    ("CAD", AttributeKind::Categorical),
    ("CVD", AttributeKind::Categorical),
    ("AAA", AttributeKind::Categorical),
    ("PAD", AttributeKind::Categorical),
    ("Time since last diagnosis", AttributeKind::Continuous),
    ("HDL", AttributeKind::Continuous),
    ("Total cholesterol", AttributeKind::Continuous),
    ("eGFR", AttributeKind::Continuous),
    ("hsCRP", AttributeKind::Continuous),
    ("SMART 10 Y Risk Score", AttributeKind::Continuous),
    ("Unmet Risk", AttributeKind::Continuous),
];

impl Default for HeaderSchema {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS
                .iter()
                .map(|(header, kind)| ColumnSpec {
                    header: header.to_string(),
                    kind: *kind,
                })
                .collect(),
        }
    }
}

impl HeaderSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self { columns })
    }

    /// Loads a replacement header table from TOML (`[[columns]]` entries).
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = fs::read_to_string(path)?;
        let schema: HeaderSchema = toml::from_str(&text)?;
        Self::new(schema.columns)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Result<&ColumnSpec, SchemaError> {
        self.columns
            .get(index)
            .ok_or(SchemaError::ColumnOutOfRange {
                index,
                width: self.columns.len(),
            })
    }

    /// The model key for a column: header lower-cased with spaces turned into hyphens.
    pub fn field_label(&self, index: usize) -> Result<String, SchemaError> {
        Ok(field_label(&self.column(index)?.header))
    }
}

/// `"On hypertension treatment"` becomes `"on-hypertension-treatment"`.
pub fn field_label(header: &str) -> String {
    header.to_lowercase().replace(' ', "-")
}

/// The three weight models built from the default header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskModel {
    Ascvd,
    Smart,
    Umri,
}

impl RiskModel {
    pub fn attribute_indices(self) -> Vec<usize> {
        match self {
            RiskModel::Ascvd => (0..=8).collect(),
            RiskModel::Smart => (10..=23).collect(),
            RiskModel::Umri => (0..=8).chain([22, 23]).collect(),
        }
    }

    pub fn target_index(self) -> usize {
        match self {
            RiskModel::Ascvd => 9,
            RiskModel::Smart => 24,
            RiskModel::Umri => 25,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RiskModel::Ascvd => "ascvd",
            RiskModel::Smart => "smart",
            RiskModel::Umri => "umri",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_labels_match_model_keys() {
        let schema = HeaderSchema::default();
        assert_eq!(schema.len(), 26);
        assert_eq!(schema.field_label(4).unwrap(), "total-cholesterol");
        assert_eq!(schema.field_label(8).unwrap(), "on-hypertension-treatment");
        assert_eq!(schema.field_label(22).unwrap(), "egfr");
        assert_eq!(schema.field_label(25).unwrap(), "unmet-risk");
    }

    #[test]
    fn risk_models_address_existing_columns() {
        let schema = HeaderSchema::default();
        for risk in [RiskModel::Ascvd, RiskModel::Smart, RiskModel::Umri] {
            for index in risk.attribute_indices() {
                assert!(schema.column(index).is_ok());
            }
            assert_eq!(
                schema.column(risk.target_index()).unwrap().kind,
                AttributeKind::Continuous
            );
        }
        assert_eq!(RiskModel::Umri.attribute_indices().len(), 11);
    }

    #[test]
    fn out_of_range_column_is_reported() {
        let schema = HeaderSchema::default();
        match schema.field_label(26) {
            Err(SchemaError::ColumnOutOfRange { index, width }) => {
                assert_eq!((index, width), (26, 26));
            }
            other => panic!("Expected ColumnOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn schema_loads_from_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[columns]]\nheader = \"Blood Type\"\nkind = \"categorical\"\n\n\
             [[columns]]\nheader = \"Score\"\nkind = \"continuous\""
        )
        .unwrap();
        let schema = HeaderSchema::load(file.path()).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.field_label(0).unwrap(), "blood-type");
        assert_eq!(schema.column(1).unwrap().kind, AttributeKind::Continuous);
    }

    #[test]
    fn empty_schema_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "columns = []").unwrap();
        assert!(matches!(
            HeaderSchema::load(file.path()),
            Err(SchemaError::Empty)
        ));
    }
}
