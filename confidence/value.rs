//! # Value Keys and Column Coercion
//!
//! Raw column values arrive as text. Before grouping, a whole column is either
//! promoted to `f64` or kept as text. The decision is made once per column and
//! never per element, so a single group set can never mix numeric and text keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A group key: one observed attribute value after column coercion.
///
/// Numeric keys are always finite; coercion rejects `NaN` and infinities, which
/// is what makes the bitwise `Eq`/`Hash` below sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueKey {
    Numeric(f64),
    Text(String),
}

impl ValueKey {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ValueKey::Numeric(v) => Some(*v),
            ValueKey::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKey::Numeric(_))
    }

    /// Collapses `-0.0` onto `0.0` so both land in the same group.
    fn numeric_bits(v: f64) -> u64 {
        if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueKey::Numeric(a), ValueKey::Numeric(b)) => {
                Self::numeric_bits(*a) == Self::numeric_bits(*b)
            }
            (ValueKey::Text(a), ValueKey::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ValueKey::Numeric(v) => {
                0u8.hash(state);
                Self::numeric_bits(*v).hash(state);
            }
            ValueKey::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKey::Numeric(v) => write!(f, "{v}"),
            ValueKey::Text(s) => f.write_str(s),
        }
    }
}

/// How a column containing at least one non-numeric value is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionPolicy {
    /// The whole column is kept as text. A single stray token in an otherwise
    /// numeric column therefore turns a continuous attribute into a categorical one.
    #[default]
    Permissive,
    /// Any non-numeric value is an error. Weight-model building applies this only
    /// to columns the schema declares continuous.
    Strict,
}

/// The outcome of coercing one column.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedColumn {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl CoercedColumn {
    pub fn len(&self) -> usize {
        match self {
            CoercedColumn::Numeric(v) => v.len(),
            CoercedColumn::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key_at(&self, row: usize) -> ValueKey {
        match self {
            CoercedColumn::Numeric(v) => ValueKey::Numeric(v[row]),
            CoercedColumn::Text(v) => ValueKey::Text(v[row].clone()),
        }
    }
}

/// Parses one raw cell as a finite number.
pub fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerces a column all-or-nothing.
///
/// Returns `Err((row, value))` for the first non-numeric cell when the policy is
/// strict; callers wrap it into their own error type.
pub fn coerce_column<S: AsRef<str>>(
    values: &[S],
    policy: CoercionPolicy,
) -> Result<CoercedColumn, (usize, String)> {
    let mut numeric = Vec::with_capacity(values.len());
    for (row, raw) in values.iter().enumerate() {
        match parse_finite(raw.as_ref()) {
            Some(v) => numeric.push(v),
            None => {
                return match policy {
                    CoercionPolicy::Strict => Err((row, raw.as_ref().to_string())),
                    CoercionPolicy::Permissive => Ok(CoercedColumn::Text(
                        values.iter().map(|s| s.as_ref().to_string()).collect(),
                    )),
                };
            }
        }
    }
    Ok(CoercedColumn::Numeric(numeric))
}
