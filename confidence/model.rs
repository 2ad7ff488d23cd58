//! # Weight Model
//!
//! A weight model records, for every attribute of one risk calculator, how much
//! the calculator's score varies among historical profiles sharing each attribute
//! value. Each group's standard deviation is divided by the largest group standard
//! deviation of the same attribute, so the most dispersed value maps to `1.0` and a
//! value whose profiles always score identically maps to `0.0`.
//!
//! Models are built once from a profile dataset, then only read. The builder
//! returns a finished value; there is no way to observe a partially filled model,
//! and no mutating API after construction.

use crate::data::ColumnMatrix;
use crate::group::{GroupError, GroupSummary, group_and_summarize};
use crate::schema::{AttributeKind, HeaderSchema, RiskModel, SchemaError};
use crate::value::{CoercionPolicy, ValueKey};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to group scores for attribute '{label}': {source}")]
    Group {
        label: String,
        #[source]
        source: GroupError,
    },
    #[error(
        "Attribute '{label}' is degenerate: the target score never varies within any of its groups, so its weights cannot be normalized."
    )]
    DegenerateAttribute { label: String },
    #[error("Column index {index} is outside the data, which has {width} columns.")]
    ColumnOutOfRange { index: usize, width: usize },
    #[error("Attribute '{label}' appears more than once in the model.")]
    DuplicateAttribute { label: String },
    #[error("A weight model needs at least one attribute.")]
    EmptyAttributeList,
    #[error("Attribute '{label}' has weight {weight} for key '{key}', outside [0, 1].")]
    InvalidWeight {
        label: String,
        key: String,
        weight: f64,
    },
    #[error("Attribute '{label}' has no weights.")]
    EmptyWeights { label: String },
    #[error("Attribute '{label}' has no weight of 1.0, so its weights are not normalized.")]
    Unnormalized { label: String },
    #[error("The model is missing attribute '{0}'.")]
    MissingAttribute(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Normalized standard deviation for one attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyWeight {
    pub key: ValueKey,
    pub normalized_std: f64,
}

/// All weights of one attribute, in first-seen key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeWeights {
    label: String,
    kind: AttributeKind,
    max_std: f64,
    weights: Vec<KeyWeight>,
}

impl AttributeWeights {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// The raw standard deviation every weight of this attribute was divided by.
    pub fn max_std(&self) -> f64 {
        self.max_std
    }

    pub fn weights(&self) -> &[KeyWeight] {
        &self.weights
    }

    pub fn get(&self, key: &ValueKey) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| &w.key == key)
            .map(|w| w.normalized_std)
    }

    pub fn has_numeric_keys(&self) -> bool {
        self.weights.iter().all(|w| w.key.is_numeric())
    }

    fn from_summary(
        label: String,
        kind: AttributeKind,
        summary: &GroupSummary,
    ) -> Result<Self, ModelError> {
        let max_std = summary.max_std();
        if max_std <= 0.0 {
            return Err(ModelError::DegenerateAttribute { label });
        }
        let weights = summary
            .keys
            .iter()
            .zip(&summary.stds)
            .map(|(key, std)| KeyWeight {
                key: key.clone(),
                normalized_std: std / max_std,
            })
            .collect();
        Ok(Self {
            label,
            kind,
            max_std,
            weights,
        })
    }
}

/// Per-attribute normalized standard deviations for one target risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightModel {
    target: String,
    attributes: Vec<AttributeWeights>,
}

impl WeightModel {
    /// Field label of the score column the model was built against.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn attributes(&self) -> &[AttributeWeights] {
        &self.attributes
    }

    pub fn attribute(&self, label: &str) -> Option<&AttributeWeights> {
        self.attributes.iter().find(|a| a.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.label.as_str())
    }

    /// Checks that every attribute a profile schema needs is present.
    pub fn require(&self, labels: &[&str]) -> Result<(), ModelError> {
        for label in labels {
            if self.attribute(label).is_none() {
                return Err(ModelError::MissingAttribute(label.to_string()));
            }
        }
        Ok(())
    }

    /// Saves the model in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a model from TOML and re-checks the invariants a builder guarantees.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: WeightModel = toml::from_str(&toml_string)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.attributes.is_empty() {
            return Err(ModelError::EmptyAttributeList);
        }
        let mut seen = HashSet::new();
        for attribute in &self.attributes {
            if !seen.insert(attribute.label.as_str()) {
                return Err(ModelError::DuplicateAttribute {
                    label: attribute.label.clone(),
                });
            }
            let label = || attribute.label.clone();
            if attribute.weights.is_empty() {
                return Err(ModelError::EmptyWeights { label: label() });
            }
            if !(attribute.max_std.is_finite() && attribute.max_std > 0.0) {
                return Err(ModelError::DegenerateAttribute { label: label() });
            }
            for w in &attribute.weights {
                if !(0.0..=1.0).contains(&w.normalized_std) {
                    return Err(ModelError::InvalidWeight {
                        label: label(),
                        key: w.key.to_string(),
                        weight: w.normalized_std,
                    });
                }
            }
            if !attribute.weights.iter().any(|w| w.normalized_std == 1.0) {
                return Err(ModelError::Unnormalized { label: label() });
            }
        }
        Ok(())
    }
}

/// Builds a weight model for the score in column `target_index` from the
/// attributes in `attribute_indices`, keeping their order.
pub fn build_weight_model(
    columns: &ColumnMatrix,
    schema: &HeaderSchema,
    attribute_indices: &[usize],
    target_index: usize,
    policy: CoercionPolicy,
) -> Result<WeightModel, ModelError> {
    if attribute_indices.is_empty() {
        return Err(ModelError::EmptyAttributeList);
    }

    let width = columns.width();
    let column_at = |index: usize| {
        columns
            .column(index)
            .ok_or(ModelError::ColumnOutOfRange { index, width })
    };

    let target = column_at(target_index)?;
    let target_label = schema.field_label(target_index)?;

    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(attribute_indices.len());
    for &index in attribute_indices {
        let label = schema.field_label(index)?;
        if !seen.insert(label.clone()) {
            return Err(ModelError::DuplicateAttribute { label });
        }
        plan.push((index, label, schema.column(index)?.kind, column_at(index)?));
    }

    // Attributes are independent; errors are surfaced afterwards in input order.
    let results: Vec<Result<AttributeWeights, ModelError>> = plan
        .into_par_iter()
        .map(|(index, label, declared_kind, source)| {
            // Categorical columns are never required to be numeric.
            let policy = match declared_kind {
                AttributeKind::Continuous => policy,
                AttributeKind::Categorical => CoercionPolicy::Permissive,
            };
            let summary = group_and_summarize(source, target, policy).map_err(|err| {
                ModelError::Group {
                    label: label.clone(),
                    source: err,
                }
            })?;
            log::debug!("[{label}] keys: {:?}", summary.keys);
            log::debug!("[{label}] means: {:?}", summary.means);
            log::debug!("[{label}] stds: {:?}", summary.stds);
            log::debug!("[{label}] counts: {:?}", summary.counts);

            let kind = match declared_kind {
                AttributeKind::Continuous if !summary.has_numeric_keys() => {
                    log::warn!(
                        "Column {index} ('{label}') is declared continuous but holds non-numeric values; treating it as categorical."
                    );
                    AttributeKind::Categorical
                }
                kind => kind,
            };
            let weights = AttributeWeights::from_summary(label, kind, &summary)?;
            log::info!(
                "Attribute '{}': {} groups, max std {:.6}",
                weights.label,
                weights.weights.len(),
                weights.max_std
            );
            Ok(weights)
        })
        .collect();

    let attributes = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok(WeightModel {
        target: target_label,
        attributes,
    })
}

/// Builds one of the three built-in weight models.
pub fn build_risk_model(
    columns: &ColumnMatrix,
    schema: &HeaderSchema,
    risk: RiskModel,
    policy: CoercionPolicy,
) -> Result<WeightModel, ModelError> {
    build_weight_model(
        columns,
        schema,
        &risk.attribute_indices(),
        risk.target_index(),
        policy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use approx::assert_abs_diff_eq;
    use tempfile::NamedTempFile;

    fn schema(specs: &[(&str, AttributeKind)]) -> HeaderSchema {
        HeaderSchema::new(
            specs
                .iter()
                .map(|(header, kind)| ColumnSpec {
                    header: header.to_string(),
                    kind: *kind,
                })
                .collect(),
        )
        .unwrap()
    }

    fn matrix(columns: &[&[&str]]) -> ColumnMatrix {
        ColumnMatrix::new(
            (0..columns.len()).map(|i| format!("c{i}")).collect(),
            columns
                .iter()
                .map(|c| c.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn level_schema() -> HeaderSchema {
        schema(&[
            ("Level", AttributeKind::Continuous),
            ("Group", AttributeKind::Categorical),
            ("Score", AttributeKind::Continuous),
        ])
    }

    // Level 1: scores 0,4 (std 2). Level 2: 0,8 (std 4). Level 3: 0,16 (std 8).
    fn level_matrix() -> ColumnMatrix {
        matrix(&[
            &["1", "1", "2", "2", "3", "3"],
            &["a", "b", "a", "b", "a", "b"],
            &["0", "4", "0", "8", "0", "16"],
        ])
    }

    #[test]
    fn stds_are_normalized_by_attribute_maximum() {
        let model = build_weight_model(
            &level_matrix(),
            &level_schema(),
            &[0],
            2,
            CoercionPolicy::Permissive,
        )
        .unwrap();

        assert_eq!(model.target(), "score");
        let level = model.attribute("level").unwrap();
        assert_eq!(level.kind(), AttributeKind::Continuous);
        assert_abs_diff_eq!(level.max_std(), 8.0, epsilon = 1e-12);
        let weights: Vec<f64> = level.weights().iter().map(|w| w.normalized_std).collect();
        assert_abs_diff_eq!(weights[0], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(weights[1], 0.5, epsilon = 1e-12);
        assert_eq!(weights[2], 1.0);
    }

    #[test]
    fn every_requested_attribute_gets_its_observed_keys() {
        let model = build_weight_model(
            &level_matrix(),
            &level_schema(),
            &[1, 0],
            2,
            CoercionPolicy::Permissive,
        )
        .unwrap();

        assert_eq!(model.labels().collect::<Vec<_>>(), vec!["group", "level"]);
        let group = model.attribute("group").unwrap();
        assert_eq!(group.kind(), AttributeKind::Categorical);
        assert_eq!(
            group.weights().iter().map(|w| w.key.clone()).collect::<Vec<_>>(),
            vec![ValueKey::Text("a".into()), ValueKey::Text("b".into())]
        );
        // Group 'a' always scores 0.
        assert_eq!(group.get(&ValueKey::Text("a".into())), Some(0.0));
        assert_eq!(group.get(&ValueKey::Text("b".into())), Some(1.0));
        assert!(model.require(&["group", "level"]).is_ok());
        assert!(matches!(
            model.require(&["age"]),
            Err(ModelError::MissingAttribute(label)) if label == "age"
        ));
    }

    #[test]
    fn constant_target_is_degenerate() {
        let columns = matrix(&[&["1", "2"], &["a", "b"], &["0.5", "0.5"]]);
        let err = build_weight_model(&columns, &level_schema(), &[0], 2, CoercionPolicy::Permissive)
            .unwrap_err();
        match err {
            ModelError::DegenerateAttribute { label } => assert_eq!(label, "level"),
            other => panic!("Expected DegenerateAttribute, got {other:?}"),
        }
    }

    #[test]
    fn singleton_groups_are_degenerate() {
        // Every group has one sample, so every std is zero.
        let columns = matrix(&[&["1", "2", "3"], &["a", "b", "c"], &["0.1", "0.2", "0.3"]]);
        let err = build_weight_model(&columns, &level_schema(), &[0], 2, CoercionPolicy::Permissive)
            .unwrap_err();
        assert!(matches!(err, ModelError::DegenerateAttribute { .. }));
    }

    #[test]
    fn grouping_errors_name_the_attribute() {
        let columns = matrix(&[&["1", "x", "1"], &["a", "a", "b"], &["0.1", "0.3", "0.2"]]);
        let err = build_weight_model(&columns, &level_schema(), &[1, 0], 2, CoercionPolicy::Strict)
            .unwrap_err();
        match err {
            ModelError::Group { label, source } => {
                assert_eq!(label, "level");
                assert!(matches!(source, GroupError::NonNumericSource { row: 1, .. }));
            }
            other => panic!("Expected Group error, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_continuous_column_falls_back_to_categorical() {
        let columns = matrix(&[&["1", "n/a", "1"], &["a", "a", "b"], &["0", "1", "3"]]);
        let model =
            build_weight_model(&columns, &level_schema(), &[0], 2, CoercionPolicy::Permissive)
                .unwrap();
        assert_eq!(
            model.attribute("level").unwrap().kind(),
            AttributeKind::Categorical
        );
    }

    #[test]
    fn duplicate_labels_and_bad_indices_are_rejected() {
        let dup = build_weight_model(
            &level_matrix(),
            &level_schema(),
            &[0, 0],
            2,
            CoercionPolicy::Permissive,
        );
        assert!(matches!(dup, Err(ModelError::DuplicateAttribute { .. })));

        let out = build_weight_model(
            &level_matrix(),
            &level_schema(),
            &[0],
            7,
            CoercionPolicy::Permissive,
        );
        assert!(matches!(
            out,
            Err(ModelError::ColumnOutOfRange { index: 7, width: 3 })
        ));

        let none = build_weight_model(
            &level_matrix(),
            &level_schema(),
            &[],
            2,
            CoercionPolicy::Permissive,
        );
        assert!(matches!(none, Err(ModelError::EmptyAttributeList)));
    }

    #[test]
    fn toml_round_trip_preserves_model() {
        let model = build_weight_model(
            &level_matrix(),
            &level_schema(),
            &[0, 1],
            2,
            CoercionPolicy::Permissive,
        )
        .unwrap();
        let file = NamedTempFile::new().unwrap();
        model.save(file.path()).unwrap();
        let loaded = WeightModel::load(file.path()).unwrap();
        assert_eq!(loaded, model);
        assert!(loaded.attribute("level").unwrap().has_numeric_keys());
        assert!(!loaded.attribute("group").unwrap().has_numeric_keys());
    }

    #[test]
    fn loading_rejects_out_of_range_weights() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            "target = \"score\"\n\n[[attributes]]\nlabel = \"level\"\nkind = \"continuous\"\nmax_std = 2.0\n\n\
             [[attributes.weights]]\nkey = 1.0\nnormalized_std = 1.5\n",
        )
        .unwrap();
        assert!(matches!(
            WeightModel::load(file.path()),
            Err(ModelError::InvalidWeight { .. })
        ));
    }

    fn load_attribute(body: &str) -> Result<WeightModel, ModelError> {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            format!("target = \"score\"\n\n[[attributes]]\nlabel = \"level\"\nkind = \"continuous\"\n{body}"),
        )
        .unwrap();
        WeightModel::load(file.path())
    }

    #[test]
    fn loading_rejects_attributes_a_builder_never_produces() {
        assert!(matches!(
            load_attribute("max_std = 2.0\nweights = []\n"),
            Err(ModelError::EmptyWeights { label }) if label == "level"
        ));
        assert!(matches!(
            load_attribute("max_std = 0.0\n\n[[attributes.weights]]\nkey = 1.0\nnormalized_std = 1.0\n"),
            Err(ModelError::DegenerateAttribute { label }) if label == "level"
        ));
        assert!(matches!(
            load_attribute("max_std = 2.0\n\n[[attributes.weights]]\nkey = 1.0\nnormalized_std = 0.5\n"),
            Err(ModelError::Unnormalized { label }) if label == "level"
        ));
        assert!(
            load_attribute("max_std = 2.0\n\n[[attributes.weights]]\nkey = 1.0\nnormalized_std = 1.0\n")
                .is_ok()
        );
    }
}
