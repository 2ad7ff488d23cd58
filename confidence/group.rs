//! # Grouping of Target Scores by Attribute Value
//!
//! Pairs every row's attribute value with its target risk score, partitions the
//! scores by attribute value and summarises each partition. Groups keep the order
//! in which their keys were first seen in the source column.

use crate::value::{CoercionPolicy, ValueKey, coerce_column, parse_finite};
use indexmap::IndexMap;
use ndarray::ArrayView1;
use thiserror::Error;

/// Two-sided 95% quantile of the standard normal distribution.
pub const Z_95: f64 = 1.960;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupError {
    #[error(
        "Source and target columns must be aligned by row, but the source has {source_len} values and the target has {target_len}."
    )]
    ShapeMismatch {
        source_len: usize,
        target_len: usize,
    },
    #[error("Cannot form groups from an empty column.")]
    EmptyInput,
    #[error("Source value '{value}' at row {row} is not numeric and the coercion policy is strict.")]
    NonNumericSource { row: usize, value: String },
    #[error("Target value '{value}' at row {row} is not a finite number.")]
    NonNumericTarget { row: usize, value: String },
}

/// Summary of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub key: ValueKey,
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (`ddof = 0`).
    pub std: f64,
    /// `Z_95 * std / sqrt(count)`.
    pub ci_half_width: f64,
}

/// The grouped scores plus parallel per-group statistics, all in first-seen key order.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub groups: IndexMap<ValueKey, Vec<f64>>,
    pub keys: Vec<ValueKey>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub counts: Vec<usize>,
    pub ci_half_widths: Vec<f64>,
}

impl GroupSummary {
    /// True when the source column was coerced to numbers.
    pub fn has_numeric_keys(&self) -> bool {
        self.keys.first().is_some_and(ValueKey::is_numeric)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn max_std(&self) -> f64 {
        self.stds.iter().copied().fold(0.0, f64::max)
    }

    pub fn stats(&self) -> impl Iterator<Item = GroupStats> + '_ {
        (0..self.keys.len()).map(move |i| GroupStats {
            key: self.keys[i].clone(),
            count: self.counts[i],
            mean: self.means[i],
            std: self.stds[i],
            ci_half_width: self.ci_half_widths[i],
        })
    }
}

/// Mean and population standard deviation of a non-empty sample.
pub(crate) fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let view = ArrayView1::from(values);
    let mean = view.sum() / values.len() as f64;
    (mean, view.std(0.0))
}

/// Groups `target` by the value found on the same row of `source`.
///
/// Each column is coerced to numbers as a whole: the source column falls back to
/// text under [`CoercionPolicy::Permissive`], while the target column must always
/// be numeric since its statistics are the point of the exercise.
pub fn group_and_summarize<S: AsRef<str>, T: AsRef<str>>(
    source: &[S],
    target: &[T],
    policy: CoercionPolicy,
) -> Result<GroupSummary, GroupError> {
    if source.len() != target.len() {
        return Err(GroupError::ShapeMismatch {
            source_len: source.len(),
            target_len: target.len(),
        });
    }
    if source.is_empty() {
        return Err(GroupError::EmptyInput);
    }

    let scores = target
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            parse_finite(raw.as_ref()).ok_or_else(|| GroupError::NonNumericTarget {
                row,
                value: raw.as_ref().to_string(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let keys = coerce_column(source, policy)
        .map_err(|(row, value)| GroupError::NonNumericSource { row, value })?;

    let mut groups: IndexMap<ValueKey, Vec<f64>> = IndexMap::new();
    for (row, score) in scores.into_iter().enumerate() {
        groups.entry(keys.key_at(row)).or_default().push(score);
    }

    let n_groups = groups.len();
    let mut summary = GroupSummary {
        keys: Vec::with_capacity(n_groups),
        means: Vec::with_capacity(n_groups),
        stds: Vec::with_capacity(n_groups),
        counts: Vec::with_capacity(n_groups),
        ci_half_widths: Vec::with_capacity(n_groups),
        groups: IndexMap::new(),
    };
    for (key, values) in &groups {
        let (mean, std) = mean_and_std(values);
        let count = values.len();
        summary.keys.push(key.clone());
        summary.means.push(mean);
        summary.stds.push(std);
        summary.counts.push(count);
        summary
            .ci_half_widths
            .push(Z_95 * std / (count as f64).sqrt());
    }
    summary.groups = groups;
    Ok(summary)
}
